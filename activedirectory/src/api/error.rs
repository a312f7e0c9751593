use thiserror::Error;

/// LDAP result code returned when an entry already exists.
pub const RC_ALREADY_EXISTS: u32 = 68;

/// LDAP result code returned when the target entry does not exist.
pub const RC_NO_SUCH_OBJECT: u32 = 32;

/// Failure reported by a directory session implementation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("LDAP protocol error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("LDAP result code {rc}: {text}")]
    ResultCode { rc: u32, text: String },
}

impl SessionError {
    pub fn result_code(&self) -> Option<u32> {
        match self {
            SessionError::ResultCode { rc, .. } => Some(*rc),
            SessionError::Ldap(ldap3::LdapError::LdapResult { result }) => Some(result.rc),
            SessionError::Ldap(_) => None,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.result_code() == Some(RC_ALREADY_EXISTS)
    }

    pub fn is_no_such_object(&self) -> bool {
        self.result_code() == Some(RC_NO_SUCH_OBJECT)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{operation} failed for {target}: {source}")]
    Transport {
        operation: &'static str,
        target: String,
        #[source]
        source: SessionError,
    },

    #[error("search for {filter} under {base} returned {count} objects, expected at most one")]
    AmbiguousResult {
        filter: String,
        base: String,
        count: usize,
    },

    #[error("object {dn} already exists")]
    AlreadyExists { dn: String },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to connect to directory: {0}")]
    Connection(String),
}

impl DirectoryError {
    pub(crate) fn transport(
        operation: &'static str,
        target: impl Into<String>,
        source: SessionError,
    ) -> Self {
        DirectoryError::Transport {
            operation,
            target: target.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
