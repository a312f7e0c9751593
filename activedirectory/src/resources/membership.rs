//! Group membership reconciliation
//!
//! Membership is diffed as plain sets of directory references, compared
//! case-sensitively. When unknown members are ignored the reconciler only
//! ever adds.

use std::collections::BTreeSet;

use crate::api::{DirectoryError, Modification, ObjectRepository, Result};

pub const MEMBER_ATTRIBUTE: &str = "member";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl MembershipDiff {
    pub fn compute(
        current: &BTreeSet<String>,
        desired: &BTreeSet<String>,
        ignore_unknown_members: bool,
    ) -> Self {
        let to_add = desired.difference(current).cloned().collect();
        let to_remove = if ignore_unknown_members {
            BTreeSet::new()
        } else {
            current.difference(desired).cloned().collect()
        };
        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// One modify request carrying both halves, or `None` when converged.
    pub fn to_modification(&self) -> Option<Modification> {
        if self.is_empty() {
            return None;
        }
        let mut changes = Modification::new();
        if !self.to_add.is_empty() {
            changes = changes.add(MEMBER_ATTRIBUTE, self.to_add.iter().cloned().collect());
        }
        if !self.to_remove.is_empty() {
            changes = changes.delete(MEMBER_ATTRIBUTE, self.to_remove.iter().cloned().collect());
        }
        Some(changes)
    }
}

/// Read the live membership of `group_dn` and write the difference to `desired`.
pub async fn reconcile(
    repository: &ObjectRepository,
    group_dn: &str,
    desired: &BTreeSet<String>,
    ignore_unknown_members: bool,
) -> Result<MembershipDiff> {
    let current: BTreeSet<String> = repository
        .member_values(group_dn, MEMBER_ATTRIBUTE)
        .await?
        .into_iter()
        .collect();

    let diff = MembershipDiff::compute(&current, desired, ignore_unknown_members);
    tracing::info!(
        "Membership of {}: {} to add, {} to remove",
        group_dn,
        diff.to_add.len(),
        diff.to_remove.len()
    );

    match diff.to_modification() {
        None => tracing::debug!("Membership of {} already converged", group_dn),
        Some(changes) => repository
            .session()
            .modify(group_dn, changes)
            .await
            .map_err(|e| DirectoryError::transport("update members", group_dn, e))?,
    }

    Ok(diff)
}
