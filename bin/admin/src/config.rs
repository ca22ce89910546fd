//! Admin tool configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `GATEHOUSE`, using `__` to separate nested keys:
//!
//! ```text
//! GATEHOUSE__PROVIDER__API_KEY=...
//! GATEHOUSE__PROVIDER__PROJECT_ID=my-project
//! GATEHOUSE__ALLOW_LIST__COLLECTION=allowedUsers
//! GATEHOUSE__ACCESS_TOKEN=...
//! ```

use gatehouse_access::AllowListConfig;
use gatehouse_services::ProviderConfig;
use serde::Deserialize;

/// Admin tool configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    /// Hosted project coordinates.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Allow-list storage.
    #[serde(default)]
    pub allow_list: AllowListConfig,

    /// OAuth bearer token sent with database requests, for rules that
    /// require an authenticated caller.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Override of the database REST root, e.g. a local emulator.
    #[serde(default)]
    pub api_root: Option<String>,
}

impl AdminConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but cannot be deserialized.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_builder(config::Config::builder().add_source(
            config::Environment::with_prefix("GATEHOUSE")
                .separator("__")
                .try_parsing(true),
        ))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_takes_defaults() {
        let config = AdminConfig::from_builder(config::Config::builder()).expect("load");
        assert_eq!(config.allow_list.collection(), "allowedUsers");
        assert!(config.access_token.is_none());
        assert_eq!(config.provider.missing_required().len(), 3);
    }

    #[test]
    fn nested_values_are_read() {
        let builder = config::Config::builder()
            .set_override("provider.project_id", "demo")
            .expect("override")
            .set_override("provider.api_key", "key")
            .expect("override")
            .set_override("allow_list.collection", "admins")
            .expect("override");

        let config = AdminConfig::from_builder(builder).expect("load");
        assert_eq!(config.provider.project_id(), "demo");
        assert_eq!(config.provider.api_key(), "key");
        assert_eq!(config.allow_list.collection(), "admins");
    }
}
