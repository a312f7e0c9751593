//! Provider configuration
//!
//! Values come from the provider block handed over by the hosting framework,
//! with each field falling back to an `AD_*` environment variable.

use serde::Deserialize;
use std::fmt;
use url::Url;

use crate::api::dn;
use crate::api::{DirectoryError, Result};

pub const DEFAULT_LDAP_PORT: u16 = 389;
pub const DEFAULT_LDAPS_PORT: u16 = 636;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProviderBlock {
    host: Option<String>,
    port: Option<u16>,
    domain: Option<String>,
    user: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
    insecure: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub host: String,
    pub port: u16,
    pub domain: String,
    pub user: String,
    pub password: String,
    pub use_tls: bool,
    pub insecure: bool,
    pub timeout_secs: u64,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("insecure", &self.insecure)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.parse::<T>().ok())
}

fn required(value: Option<String>, field: &str, env: &str) -> Result<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        DirectoryError::InvalidConfiguration(format!(
            "{} is required (set in provider config or {} env var)",
            field, env
        ))
    })
}

impl ProviderConfig {
    /// Build from the provider block, filling gaps from the environment
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let block = if value.is_null() {
            ProviderBlock::default()
        } else {
            ProviderBlock::deserialize(value)
                .map_err(|e| DirectoryError::InvalidConfiguration(e.to_string()))?
        };

        let host = required(block.host.or_else(|| env_string("AD_HOST")), "host", "AD_HOST")?;
        let domain = required(
            block.domain.or_else(|| env_string("AD_DOMAIN")),
            "domain",
            "AD_DOMAIN",
        )?;
        let user = required(block.user.or_else(|| env_string("AD_USER")), "user", "AD_USER")?;
        let password = required(
            block.password.or_else(|| env_string("AD_PASSWORD")),
            "password",
            "AD_PASSWORD",
        )?;

        let use_tls = block
            .use_tls
            .or_else(|| env_parsed("AD_USE_TLS"))
            .unwrap_or(false);
        let insecure = block
            .insecure
            .or_else(|| env_parsed("AD_INSECURE"))
            .unwrap_or(false);
        let port = block
            .port
            .or_else(|| env_parsed("AD_PORT"))
            .unwrap_or(if use_tls {
                DEFAULT_LDAPS_PORT
            } else {
                DEFAULT_LDAP_PORT
            });

        Ok(Self {
            host,
            port,
            domain,
            user,
            password,
            use_tls,
            insecure,
            timeout_secs: block.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// `example.com` as `dc=example,dc=com`
    pub fn domain_dn(&self) -> String {
        dn::domain_dn(&self.domain)
    }

    /// UPNs and DNs are used as given, bare account names get `@domain`.
    pub fn bind_name(&self) -> String {
        if self.user.contains('@') || self.user.contains('=') {
            self.user.clone()
        } else {
            format!("{}@{}", self.user, self.domain)
        }
    }

    /// `ldaps://` on the LDAPS port when TLS is requested, `ldap://` otherwise
    /// (StartTLS is negotiated on a plain port).
    pub fn ldap_url(&self) -> Result<Url> {
        let scheme = if self.use_tls && self.port != DEFAULT_LDAP_PORT {
            "ldaps"
        } else {
            "ldap"
        };
        let url = Url::parse(&format!("{}://{}:{}", scheme, self.host, self.port)).map_err(|e| {
            DirectoryError::InvalidConfiguration(format!("host {}: {}", self.host, e))
        })?;
        if url.host_str().is_none() {
            return Err(DirectoryError::InvalidConfiguration(format!(
                "host {} is not a valid host name",
                self.host
            )));
        }
        Ok(url)
    }
}
