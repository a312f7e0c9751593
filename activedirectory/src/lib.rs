pub mod api;
pub mod config;
pub mod provider_data;
pub mod resources;

pub use provider_data::ActiveDirectoryProviderData;

use std::sync::Arc;

use api::{DirectoryError, DirectorySession, LdapSession, Result};
use config::ProviderConfig;
use resources::{DirectoryResource, GroupResource, UserResource};

/// Entry point handed to the hosting framework
#[derive(Default)]
pub struct ActiveDirectoryProvider {
    data: Option<ActiveDirectoryProviderData>,
}

impl ActiveDirectoryProvider {
    pub fn new() -> Self {
        Self { data: None }
    }

    /// Provider already wired to `session`, skipping `configure`
    pub fn with_session(session: Arc<dyn DirectorySession>, domain: impl Into<String>) -> Self {
        Self {
            data: Some(ActiveDirectoryProviderData::new(session, domain)),
        }
    }

    /// Read the provider block, connect and bind
    pub async fn configure(&mut self, config: serde_json::Value) -> Result<()> {
        let config = ProviderConfig::from_value(&config)?;
        tracing::info!(
            "Configuring AD provider for {} on {}:{}",
            config.domain,
            config.host,
            config.port
        );

        let session = LdapSession::connect(&config).await?;
        self.data = Some(ActiveDirectoryProviderData::new(
            Arc::new(session),
            config.domain,
        ));
        Ok(())
    }

    pub fn provider_data(&self) -> Result<&ActiveDirectoryProviderData> {
        self.data.as_ref().ok_or_else(|| {
            DirectoryError::InvalidConfiguration(
                "provider has not been configured".to_string(),
            )
        })
    }

    pub fn user_resource(&self) -> Result<UserResource> {
        Ok(UserResource::new(self.provider_data()?))
    }

    pub fn group_resource(&self) -> Result<GroupResource> {
        Ok(GroupResource::new(self.provider_data()?))
    }

    pub fn resource_names(&self) -> Vec<&'static str> {
        match (self.user_resource(), self.group_resource()) {
            (Ok(user), Ok(group)) => vec![user.type_name(), group.type_name()],
            _ => vec!["activedirectory_user", "activedirectory_group"],
        }
    }
}

/// Maps a `TF_LOG` value to a tracing level, `INFO` when unset or unknown.
pub fn log_level(value: Option<&str>) -> tracing::Level {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => tracing::Level::TRACE,
        Some("debug") => tracing::Level::DEBUG,
        Some("warn") => tracing::Level::WARN,
        Some("error") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Install the stderr subscriber. Calling it again is a no-op.
pub fn init_logging() {
    let level = log_level(std::env::var("TF_LOG").ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}
