use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::time::Duration;

use super::attributes::MultiValued;
use super::error::{DirectoryError, SessionError};
use super::session::{DirectorySession, Modification, RawEntry, SearchScope};
use crate::config::ProviderConfig;

/// Directory session backed by an ldap3 connection
#[derive(Clone)]
pub struct LdapSession {
    ldap: Ldap,
}

impl LdapSession {
    /// Dial the configured server and bind with the provider credentials
    pub async fn connect(config: &ProviderConfig) -> Result<Self, DirectoryError> {
        let url = config.ldap_url()?;
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.timeout_secs))
            .set_starttls(config.use_tls && url.scheme() == "ldap")
            .set_no_tls_verify(config.insecure);

        tracing::debug!("Connecting to {}", url);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(|e| DirectoryError::Connection(format!("{}: {}", url, e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::error!("LDAP connection driver error: {}", e);
            }
        });

        let bind_name = config.bind_name();
        let result = ldap
            .simple_bind(&bind_name, &config.password)
            .await
            .map_err(|e| DirectoryError::Connection(format!("bind as {}: {}", bind_name, e)))?;
        if result.rc != 0 {
            tracing::error!("Authentication failed for {}: {}", bind_name, result.text);
            return Err(DirectoryError::Connection(format!(
                "bind as {} rejected with code {}: {}",
                bind_name, result.rc, result.text
            )));
        }

        tracing::debug!("AD connection successful for {}", bind_name);
        Ok(Self { ldap })
    }
}

fn check(result: LdapResult) -> Result<(), SessionError> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(SessionError::ResultCode {
            rc: result.rc,
            text: result.text,
        })
    }
}

/// AD only accepts `unicodePwd` as a quoted UTF-16LE string.
fn encode_password(password: &str) -> Vec<u8> {
    format!("\"{}\"", password)
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

fn wire_values(attribute: &str, values: &[String]) -> HashSet<Vec<u8>> {
    if attribute.eq_ignore_ascii_case("unicodePwd") {
        values.iter().map(|v| encode_password(v)).collect()
    } else {
        values.iter().map(|v| v.as_bytes().to_vec()).collect()
    }
}

fn wire_mods(changes: Modification) -> Vec<Mod<Vec<u8>>> {
    let mut mods = Vec::new();
    for (name, values) in &changes.add {
        mods.push(Mod::Add(name.as_bytes().to_vec(), wire_values(name, values)));
    }
    for (name, values) in &changes.replace {
        mods.push(Mod::Replace(name.as_bytes().to_vec(), wire_values(name, values)));
    }
    for (name, values) in &changes.delete {
        mods.push(Mod::Delete(name.as_bytes().to_vec(), wire_values(name, values)));
    }
    mods
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<RawEntry>, SessionError> {
        let scope = match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        };

        let mut ldap = self.ldap.clone();
        let ldap3::SearchResult(entries, result) =
            ldap.search(base, scope, filter, attributes.to_vec()).await?;
        check(result)?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                RawEntry {
                    dn: entry.dn,
                    attributes: entry.attrs.into_iter().collect::<MultiValued>(),
                }
            })
            .collect())
    }

    async fn add(
        &self,
        dn: &str,
        object_classes: &[&str],
        attributes: MultiValued,
    ) -> Result<(), SessionError> {
        let mut entry: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = Vec::with_capacity(attributes.len() + 1);
        entry.push((
            b"objectClass".to_vec(),
            object_classes.iter().map(|c| c.as_bytes().to_vec()).collect(),
        ));
        for (name, values) in &attributes {
            if values.is_empty() {
                continue;
            }
            entry.push((name.as_bytes().to_vec(), wire_values(name, values)));
        }

        let mut ldap = self.ldap.clone();
        check(ldap.add(dn, entry).await?)
    }

    async fn modify(&self, dn: &str, changes: Modification) -> Result<(), SessionError> {
        let mut ldap = self.ldap.clone();
        check(ldap.modify(dn, wire_mods(changes)).await?)
    }

    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_parent: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut ldap = self.ldap.clone();
        check(ldap.modifydn(dn, new_rdn, delete_old_rdn, new_parent).await?)
    }

    async fn delete(&self, dn: &str) -> Result<(), SessionError> {
        let mut ldap = self.ldap.clone();
        check(ldap.delete(dn).await?)
    }
}
