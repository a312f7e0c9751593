//! Provider data structure passed to resources

use crate::api::{dn, DirectorySession};
use std::sync::Arc;

#[derive(Clone)]
pub struct ActiveDirectoryProviderData {
    pub session: Arc<dyn DirectorySession>,
    /// DNS name of the domain, e.g. `example.com`
    pub domain: String,
}

impl ActiveDirectoryProviderData {
    pub fn new(session: Arc<dyn DirectorySession>, domain: impl Into<String>) -> Self {
        Self {
            session,
            domain: domain.into(),
        }
    }

    pub fn domain_dn(&self) -> String {
        dn::domain_dn(&self.domain)
    }
}
