//! Group resource implementation
//!
//! A group is addressed by its derived DN. Members are configured either as
//! DNs or as account names, which are resolved to DNs before diffing.

use async_trait::async_trait;
use ldap3::ldap_escape;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::membership::{self, MEMBER_ATTRIBUTE};
use super::{configured_or_live, converge_description, DirectoryResource, Resolved};
use crate::api::dn::{self, derive_group_dn, group_rdn};
use crate::api::{
    encode, Attributes, DirectoryError, DirectoryObject, Modification, ObjectRepository, Result,
};
use crate::provider_data::ActiveDirectoryProviderData;

pub const GROUP_OBJECT_CLASSES: [&str; 2] = ["top", "group"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredGroup {
    pub name: String,
    pub base_ou: String,
    /// Where account-name members are looked up; the domain root when empty
    #[serde(default)]
    pub user_base: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "member")]
    pub members: BTreeSet<String>,
    #[serde(default, alias = "ignore_members_unknown_by_terraform")]
    pub ignore_unknown_members: bool,
}

impl DesiredGroup {
    /// Parse, normalise and validate the resource configuration
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let mut group = Self::deserialize(value)
            .map_err(|e| DirectoryError::InvalidConfiguration(format!("group: {}", e)))?;
        group.members = group
            .members
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        group.validate()?;
        Ok(group)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::InvalidConfiguration(
                "group name must not be empty".to_string(),
            ));
        }
        if !dn::looks_like_dn(&self.base_ou) {
            return Err(DirectoryError::InvalidConfiguration(format!(
                "group base_ou {:?} is not a distinguished name",
                self.base_ou
            )));
        }
        if !self.user_base.is_empty() && !dn::looks_like_dn(&self.user_base) {
            return Err(DirectoryError::InvalidConfiguration(format!(
                "group user_base {:?} is not a distinguished name",
                self.user_base
            )));
        }
        if self.members.iter().any(|m| m.trim().is_empty()) {
            return Err(DirectoryError::InvalidConfiguration(
                "group members must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dn(&self) -> String {
        derive_group_dn(&self.name, &self.base_ou)
    }
}

pub struct GroupResource {
    repository: ObjectRepository,
    domain_dn: String,
}

impl GroupResource {
    pub fn new(provider_data: &ActiveDirectoryProviderData) -> Self {
        Self {
            repository: ObjectRepository::new(provider_data.session.clone()),
            domain_dn: provider_data.domain_dn(),
        }
    }

    /// Map each resolvable member DN to the identifier it was configured as.
    /// With `strict`, an identifier that matches nothing is an error.
    async fn resolve_members(
        &self,
        desired: &DesiredGroup,
        strict: bool,
    ) -> Result<BTreeMap<String, String>> {
        let base = if desired.user_base.is_empty() {
            self.domain_dn.as_str()
        } else {
            desired.user_base.as_str()
        };

        let mut resolved = BTreeMap::new();
        for member in &desired.members {
            if dn::looks_like_dn(member) {
                resolved.insert(member.clone(), member.clone());
                continue;
            }

            let filter = format!(
                "(&(|(objectClass=user)(objectClass=group))(sAMAccountName={}))",
                ldap_escape(member)
            );
            match self.repository.find_one(&filter, base, &[]).await? {
                Some(object) => {
                    tracing::debug!("Resolved member {} to {}", member, object.dn);
                    resolved.insert(object.dn, member.clone());
                }
                None if strict => {
                    return Err(DirectoryError::InvariantViolation(format!(
                        "member {} of group {} not found under {}",
                        member, desired.name, base
                    )))
                }
                None => tracing::warn!("Member {} of group {} not found", member, desired.name),
            }
        }
        Ok(resolved)
    }

    async fn converge_members(
        &self,
        desired: &DesiredGroup,
        group_dn: &str,
        resolved: BTreeMap<String, String>,
    ) -> Result<()> {
        let wanted: BTreeSet<String> = resolved.into_keys().collect();
        membership::reconcile(
            &self.repository,
            group_dn,
            &wanted,
            desired.ignore_unknown_members,
        )
        .await?;
        Ok(())
    }

    async fn fetch(&self, group_dn: &str) -> Result<Option<DirectoryObject>> {
        let live = self
            .repository
            .get_by_dn(group_dn, &["cn", "description", "sAMAccountName"])
            .await?;
        match live {
            Some(object) if !object.is_kind("group") => Err(DirectoryError::InvariantViolation(
                format!("{} is not a group object", object.dn),
            )),
            other => Ok(other),
        }
    }

    fn creation_attributes(desired: &DesiredGroup) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("cn", desired.name.clone());
        attributes.insert("name", desired.name.clone());
        attributes.insert("sAMAccountName", desired.name.clone());
        if !desired.description.is_empty() {
            attributes.insert("description", desired.description.clone());
        }
        attributes
    }

    fn reported_members(
        desired: &DesiredGroup,
        live: Vec<String>,
        resolved: &BTreeMap<String, String>,
    ) -> BTreeSet<String> {
        live.into_iter()
            .filter_map(|member| match resolved.get(&member) {
                Some(configured) => Some(configured.clone()),
                None if desired.ignore_unknown_members => None,
                None => Some(member),
            })
            .collect()
    }
}

#[async_trait]
impl DirectoryResource for GroupResource {
    type State = DesiredGroup;

    fn type_name(&self) -> &'static str {
        "activedirectory_group"
    }

    async fn create(&self, desired: &DesiredGroup) -> Result<Resolved<DesiredGroup>> {
        let group_dn = desired.dn();
        tracing::info!("Creating AD group object {}", group_dn);

        let resolved = self.resolve_members(desired, true).await?;

        match self.fetch(&group_dn).await? {
            Some(existing) => {
                tracing::info!("Adopting existing group object {}", existing.dn);
                converge_description(&self.repository, &existing, &desired.description).await?;
            }
            None => {
                let attributes = encode(&Self::creation_attributes(desired));
                tracing::debug!("Adding {} with {} attributes", group_dn, attributes.len());
                self.repository
                    .session()
                    .add(&group_dn, &GROUP_OBJECT_CLASSES, attributes)
                    .await
                    .map_err(|e| {
                        if e.is_already_exists() {
                            DirectoryError::AlreadyExists {
                                dn: group_dn.clone(),
                            }
                        } else {
                            DirectoryError::transport("create group", group_dn.as_str(), e)
                        }
                    })?;
            }
        }

        self.converge_members(desired, &group_dn, resolved).await?;

        self.read(desired).await?.ok_or_else(|| {
            DirectoryError::InvariantViolation(format!("group {} vanished after create", group_dn))
        })
    }

    async fn read(&self, desired: &DesiredGroup) -> Result<Option<Resolved<DesiredGroup>>> {
        let group_dn = desired.dn();
        tracing::info!("Reading AD group object {}", group_dn);

        let Some(live) = self.fetch(&group_dn).await? else {
            tracing::warn!("Group object {} no longer exists", group_dn);
            return Ok(None);
        };

        let members = self
            .repository
            .member_values(&live.dn, MEMBER_ATTRIBUTE)
            .await?;
        let resolved = self.resolve_members(desired, false).await?;
        let live_base = dn::parent_dn(&live.dn).unwrap_or_default();

        let mut state = desired.clone();
        state.base_ou = configured_or_live(&desired.base_ou, &live_base);
        state.description = live.attribute("description").to_string();
        state.members = Self::reported_members(desired, members, &resolved);

        Ok(Some(Resolved {
            id: dn::identity(&live.dn),
            state,
        }))
    }

    async fn update(
        &self,
        desired: &DesiredGroup,
        previous: &DesiredGroup,
    ) -> Result<Resolved<DesiredGroup>> {
        let target = desired.dn();
        tracing::info!("Updating AD group object {}", target);

        let resolved = self.resolve_members(desired, true).await?;

        let live = match self.fetch(&previous.dn()).await? {
            Some(object) => object,
            None => self.fetch(&target).await?.ok_or_else(|| {
                DirectoryError::InvariantViolation(format!(
                    "group {} does not exist, cannot update",
                    previous.dn()
                ))
            })?,
        };

        converge_description(&self.repository, &live, &desired.description).await?;

        if dn::dn_eq(&live.dn, &target) {
            tracing::debug!("Group object {} is already at {}", live.dn, target);
        } else {
            tracing::info!("Moving group object {} to {}", live.dn, target);
            self.repository
                .session()
                .modify_dn(&live.dn, &group_rdn(&desired.name), true, Some(&desired.base_ou))
                .await
                .map_err(|e| DirectoryError::transport("move group", live.dn.as_str(), e))?;
        }

        if previous.name != desired.name && live.attribute("sAMAccountName") != desired.name {
            tracing::info!("Renaming account of group object {} to {}", target, desired.name);
            self.repository
                .session()
                .modify(
                    &target,
                    Modification::new().replace("sAMAccountName", vec![desired.name.clone()]),
                )
                .await
                .map_err(|e| DirectoryError::transport("rename group", target.as_str(), e))?;
        }

        self.converge_members(desired, &target, resolved).await?;

        self.read(desired).await?.ok_or_else(|| {
            DirectoryError::InvariantViolation(format!("group {} vanished during update", target))
        })
    }

    async fn delete(&self, desired: &DesiredGroup) -> Result<()> {
        let group_dn = desired.dn();
        tracing::info!("Deleting AD group object {}", group_dn);
        self.repository
            .session()
            .delete(&group_dn)
            .await
            .map_err(|e| DirectoryError::transport("delete group", group_dn.as_str(), e))
    }
}
