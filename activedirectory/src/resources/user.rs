//! User resource implementation

use async_trait::async_trait;
use ldap3::ldap_escape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{configured_or_live, converge_description, DirectoryResource, Resolved};
use crate::api::dn::{self, derive_user_dn, user_common_name, user_rdn};
use crate::api::{encode, Attributes, DirectoryError, DirectoryObject, ObjectRepository, Result};
use crate::provider_data::ActiveDirectoryProviderData;

pub const USER_OBJECT_CLASSES: [&str; 4] = ["top", "person", "organizationalPerson", "user"];

/// Normal account, password not required
const USER_ACCOUNT_CONTROL: &str = "544";

/// Configuration of one AD user
///
/// First name, last name, login, email, password and the extra attributes
/// are fixed at creation; changing them means replacing the user.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredUser {
    pub first_name: String,
    pub last_name: String,
    pub login: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    pub ou: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl std::fmt::Debug for DesiredUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesiredUser")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("login", &self.login)
            .field("email", &self.email)
            .field("ou", &self.ou)
            .field("description", &self.description)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl DesiredUser {
    /// Parse and validate the resource configuration
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let user = Self::deserialize(value)
            .map_err(|e| DirectoryError::InvalidConfiguration(format!("user: {}", e)))?;
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("login", &self.login),
        ] {
            if value.trim().is_empty() {
                return Err(DirectoryError::InvalidConfiguration(format!(
                    "user {} must not be empty",
                    field
                )));
            }
        }
        if !dn::looks_like_dn(&self.ou) {
            return Err(DirectoryError::InvalidConfiguration(format!(
                "user ou {:?} is not a distinguished name",
                self.ou
            )));
        }
        if self.attributes.keys().any(|k| k.trim().is_empty()) {
            return Err(DirectoryError::InvalidConfiguration(
                "user attribute names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dn(&self) -> String {
        derive_user_dn(&self.first_name, &self.last_name, &self.ou)
    }
}

pub struct UserResource {
    repository: ObjectRepository,
    domain: String,
    domain_dn: String,
}

impl UserResource {
    pub fn new(provider_data: &ActiveDirectoryProviderData) -> Self {
        Self {
            repository: ObjectRepository::new(provider_data.session.clone()),
            domain: provider_data.domain.clone(),
            domain_dn: provider_data.domain_dn(),
        }
    }

    /// Built-in attributes first, extra attributes merged over them.
    fn creation_attributes(&self, desired: &DesiredUser) -> Attributes {
        let common_name = user_common_name(&desired.first_name, &desired.last_name);

        let mut attributes = Attributes::new();
        attributes.insert("cn", common_name.clone());
        attributes.insert("name", common_name.clone());
        attributes.insert("displayName", common_name);
        attributes.insert("givenName", desired.first_name.clone());
        attributes.insert("sn", desired.last_name.clone());
        attributes.insert("sAMAccountName", desired.login.clone());
        attributes.insert("userPrincipalName", format!("{}@{}", desired.login, self.domain));
        attributes.insert("userAccountControl", USER_ACCOUNT_CONTROL);
        if !desired.email.is_empty() {
            attributes.insert("mail", desired.email.clone());
        }
        if !desired.description.is_empty() {
            attributes.insert("description", desired.description.clone());
        }
        if !desired.password.is_empty() {
            attributes.insert("unicodePwd", desired.password.clone());
        }

        let extra: Attributes = desired.attributes.iter().collect();
        attributes.merge(&extra);
        attributes
    }

    /// Users are located by login so one moved outside this tool is still found.
    async fn locate(&self, desired: &DesiredUser) -> Result<Option<DirectoryObject>> {
        let filter = format!(
            "(&(objectClass=user)(sAMAccountName={}))",
            ldap_escape(&desired.login)
        );
        let mut wanted = vec!["cn", "description"];
        wanted.extend(desired.attributes.keys().map(String::as_str));

        self.repository.find_one(&filter, &self.domain_dn, &wanted).await
    }

    fn resolve(&self, desired: &DesiredUser, live: &DirectoryObject) -> Resolved<DesiredUser> {
        let live_ou = dn::parent_dn(&live.dn).unwrap_or_default();

        let mut state = desired.clone();
        state.ou = configured_or_live(&desired.ou, &live_ou);
        state.description = live.attribute("description").to_string();
        state.attributes = desired
            .attributes
            .keys()
            .map(|k| (k.clone(), live.attribute(k).to_string()))
            .collect();

        Resolved {
            id: dn::identity(&live.dn),
            state,
        }
    }
}

#[async_trait]
impl DirectoryResource for UserResource {
    type State = DesiredUser;

    fn type_name(&self) -> &'static str {
        "activedirectory_user"
    }

    async fn create(&self, desired: &DesiredUser) -> Result<Resolved<DesiredUser>> {
        let dn = desired.dn();
        tracing::info!("Creating AD user object {}", dn);

        if let Some(existing) = self.repository.get_by_dn(&dn, &[]).await? {
            if existing.is_kind("user") && !existing.is_kind("computer") {
                return Err(DirectoryError::AlreadyExists { dn: existing.dn });
            }
            return Err(DirectoryError::InvariantViolation(format!(
                "{} already exists and is not a user object",
                existing.dn
            )));
        }

        let attributes = encode(&self.creation_attributes(desired));
        tracing::debug!("Adding {} with {} attributes", dn, attributes.len());
        self.repository
            .session()
            .add(&dn, &USER_OBJECT_CLASSES, attributes)
            .await
            .map_err(|e| {
                if e.is_already_exists() {
                    DirectoryError::AlreadyExists { dn: dn.clone() }
                } else {
                    DirectoryError::transport("create user", dn.as_str(), e)
                }
            })?;

        self.read(desired).await?.ok_or_else(|| {
            DirectoryError::InvariantViolation(format!("user {} vanished after create", dn))
        })
    }

    async fn read(&self, desired: &DesiredUser) -> Result<Option<Resolved<DesiredUser>>> {
        tracing::info!("Reading AD user object {}", desired.login);

        match self.locate(desired).await? {
            Some(live) => Ok(Some(self.resolve(desired, &live))),
            None => {
                tracing::warn!("User object {} no longer exists", desired.login);
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        desired: &DesiredUser,
        previous: &DesiredUser,
    ) -> Result<Resolved<DesiredUser>> {
        tracing::info!("Updating AD user object {}", desired.login);

        let live = self.locate(previous).await?.ok_or_else(|| {
            DirectoryError::InvariantViolation(format!(
                "user {} does not exist, cannot update",
                previous.login
            ))
        })?;

        converge_description(&self.repository, &live, &desired.description).await?;

        let target = desired.dn();
        if dn::dn_eq(&live.dn, &target) {
            tracing::debug!("User object {} is already in the target ou", live.dn);
        } else {
            let rdn = user_rdn(&desired.first_name, &desired.last_name);
            tracing::info!("Moving user object {} to {}", live.dn, desired.ou);
            self.repository
                .session()
                .modify_dn(&live.dn, &rdn, true, Some(&desired.ou))
                .await
                .map_err(|e| DirectoryError::transport("move user", live.dn.as_str(), e))?;
        }

        self.read(desired).await?.ok_or_else(|| {
            DirectoryError::InvariantViolation(format!(
                "user {} vanished during update",
                desired.login
            ))
        })
    }

    async fn delete(&self, desired: &DesiredUser) -> Result<()> {
        let dn = desired.dn();
        tracing::info!("Deleting AD user object {}", dn);
        self.repository
            .session()
            .delete(&dn)
            .await
            .map_err(|e| DirectoryError::transport("delete user", dn.as_str(), e))
    }
}

#[cfg(test)]
#[path = "./user_test.rs"]
mod user_test;
