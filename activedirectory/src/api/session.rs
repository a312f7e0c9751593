//! Directory session abstraction
//!
//! The reconciliation layer only ever talks to the directory through this
//! trait. `LdapSession` is the production implementation; tests substitute an
//! in-memory recorder.

use async_trait::async_trait;

use super::attributes::MultiValued;
use super::error::SessionError;

/// Search depth for a directory lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the entry named by the search base
    Base,
    /// The search base and everything below it
    Subtree,
}

/// One entry returned by a search, values as the directory sent them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub dn: String,
    pub attributes: MultiValued,
}

/// Attribute changes applied by a single modify request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modification {
    pub add: MultiValued,
    pub replace: MultiValued,
    pub delete: MultiValued,
}

impl Modification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.add.insert(attribute.into(), values);
        self
    }

    pub fn replace(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.replace.insert(attribute.into(), values);
        self
    }

    pub fn delete(mut self, attribute: impl Into<String>, values: Vec<String>) -> Self {
        self.delete.insert(attribute.into(), values);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.replace.is_empty() && self.delete.is_empty()
    }
}

/// A connected, authenticated directory channel
#[async_trait]
pub trait DirectorySession: Send + Sync {
    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<RawEntry>, SessionError>;

    async fn add(
        &self,
        dn: &str,
        object_classes: &[&str],
        attributes: MultiValued,
    ) -> Result<(), SessionError>;

    async fn modify(&self, dn: &str, changes: Modification) -> Result<(), SessionError>;

    /// Rename or move `dn`. `new_parent` of `None` keeps the entry where it is.
    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_parent: Option<&str>,
    ) -> Result<(), SessionError>;

    async fn delete(&self, dn: &str) -> Result<(), SessionError>;
}
