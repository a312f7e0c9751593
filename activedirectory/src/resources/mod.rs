//! Resource implementations
//!
//! Each resource converges one kind of directory object towards the state
//! described by its configuration. No state is stored between calls: every
//! operation fetches the live object first and decides from what it finds.

pub mod group;
pub mod membership;
pub mod user;

pub use group::{DesiredGroup, GroupResource};
pub use membership::MembershipDiff;
pub use user::{DesiredUser, UserResource};

use async_trait::async_trait;

use crate::api::{DirectoryError, DirectoryObject, Modification, ObjectRepository, Result};

/// State handed back to the hosting framework after create, read or update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// Lowercased DN, the stable external identifier
    pub id: String,
    pub state: T,
}

/// Create/read/update/delete callbacks invoked by the hosting framework
#[async_trait]
pub trait DirectoryResource: Send + Sync {
    type State: Send + Sync;

    /// Type name should be constant (e.g., "activedirectory_user")
    fn type_name(&self) -> &'static str;

    /// Called to create the object; returns the state re-read from the directory
    async fn create(&self, desired: &Self::State) -> Result<Resolved<Self::State>>;

    /// `None` means the object no longer exists and the identity must be cleared
    async fn read(&self, desired: &Self::State) -> Result<Option<Resolved<Self::State>>>;

    async fn update(
        &self,
        desired: &Self::State,
        previous: &Self::State,
    ) -> Result<Resolved<Self::State>>;

    async fn delete(&self, desired: &Self::State) -> Result<()>;
}

/// Replace `description` on `live` when it differs; empty clears the attribute.
pub(crate) async fn converge_description(
    repository: &ObjectRepository,
    live: &DirectoryObject,
    description: &str,
) -> Result<()> {
    if live.attribute("description") == description {
        return Ok(());
    }

    tracing::info!("Updating description of {}", live.dn);
    let values = if description.is_empty() {
        vec![]
    } else {
        vec![description.to_string()]
    };
    repository
        .session()
        .modify(&live.dn, Modification::new().replace("description", values))
        .await
        .map_err(|e| DirectoryError::transport("update description", live.dn.as_str(), e))
}

/// Keep the configured spelling of a DN when it matches the live one.
pub(crate) fn configured_or_live(configured: &str, live: &str) -> String {
    if crate::api::dn::dn_eq(configured, live) {
        configured.to_string()
    } else {
        crate::api::dn::identity(live)
    }
}
