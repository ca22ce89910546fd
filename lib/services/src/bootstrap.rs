//! Provider bootstrap.
//!
//! Builds the handles to the external identity provider and record store
//! once and hands the same handles to every caller afterwards. The
//! configuration values are opaque strings issued by the hosting service;
//! nothing here validates them beyond logging which ones are missing.

use crate::firestore::FirestoreRecordStore;
use crate::identity::IdentityProvider;
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

/// Credentials and coordinates of the hosted identity and database project.
///
/// Every field defaults to empty so a partially configured environment
/// still deserializes; missing values are reported when handles are built.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Browser API key of the project.
    #[serde(default)]
    api_key: String,
    /// Domain that hosts the provider's sign-in flow.
    #[serde(default)]
    auth_domain: String,
    /// Project identifier; also selects the hosted database.
    #[serde(default)]
    project_id: String,
    /// Storage bucket of the project.
    #[serde(default)]
    storage_bucket: String,
    /// Messaging sender identifier of the project.
    #[serde(default)]
    messaging_sender_id: String,
    /// Application identifier registered with the project.
    #[serde(default)]
    app_id: String,
}

impl ProviderConfig {
    /// Creates a configuration with the values needed to reach the project.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        auth_domain: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            auth_domain: auth_domain.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Sets the storage bucket.
    #[must_use]
    pub fn with_storage_bucket(mut self, storage_bucket: impl Into<String>) -> Self {
        self.storage_bucket = storage_bucket.into();
        self
    }

    /// Sets the messaging sender id.
    #[must_use]
    pub fn with_messaging_sender_id(mut self, messaging_sender_id: impl Into<String>) -> Self {
        self.messaging_sender_id = messaging_sender_id.into();
        self
    }

    /// Sets the app id.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Returns the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the auth domain.
    #[must_use]
    pub fn auth_domain(&self) -> &str {
        &self.auth_domain
    }

    /// Returns the project id.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the storage bucket.
    #[must_use]
    pub fn storage_bucket(&self) -> &str {
        &self.storage_bucket
    }

    /// Returns the messaging sender id.
    #[must_use]
    pub fn messaging_sender_id(&self) -> &str {
        &self.messaging_sender_id
    }

    /// Returns the app id.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns the names of required values that are empty.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("api_key", &self.api_key),
            ("auth_domain", &self.auth_domain),
            ("project_id", &self.project_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    fn log_summary(&self) {
        if self.api_key.trim().is_empty() {
            error!(
                has_api_key = false,
                has_auth_domain = !self.auth_domain.is_empty(),
                has_project_id = !self.project_id.is_empty(),
                api_key_len = self.api_key.len(),
                auth_domain = %self.auth_domain,
                "provider API key is missing"
            );
        } else {
            info!(
                auth_domain = %self.auth_domain,
                project_id = %self.project_id,
                "provider config loaded"
            );
        }
    }
}

// The API key stays out of logs and panics.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("auth_domain", &self.auth_domain)
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .field("messaging_sender_id", &self.messaging_sender_id)
            .field("app_id", &self.app_id)
            .finish()
    }
}

/// Shared handles to the external services.
#[derive(Clone)]
pub struct ServiceHandles {
    identity: Arc<dyn IdentityProvider>,
    records: Arc<dyn RecordStore>,
}

impl ServiceHandles {
    /// Creates handles from already constructed services.
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, records: Arc<dyn RecordStore>) -> Self {
        Self { identity, records }
    }

    /// Creates handles whose record store is the project's hosted database.
    ///
    /// The identity provider is supplied by the host, which owns the
    /// interactive sign-in flow.
    #[must_use]
    pub fn hosted(config: &ProviderConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::new(identity, Arc::new(FirestoreRecordStore::from_config(config)))
    }

    /// Returns the identity provider handle.
    #[must_use]
    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.identity)
    }

    /// Returns the record store handle.
    #[must_use]
    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }
}

impl fmt::Debug for ServiceHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandles").finish_non_exhaustive()
    }
}

/// Memoizes one set of [`ServiceHandles`].
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    handles: OnceLock<ServiceHandles>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handles: OnceLock::new(),
        }
    }

    /// Returns the registered handles, building them with `build` on first
    /// use. Later calls ignore both arguments.
    pub fn get_or_init<F>(&self, config: &ProviderConfig, build: F) -> ServiceHandles
    where
        F: FnOnce(&ProviderConfig) -> ServiceHandles,
    {
        self.handles
            .get_or_init(|| {
                config.log_summary();
                build(config)
            })
            .clone()
    }

    /// Returns the handles if they have been built.
    #[must_use]
    pub fn get(&self) -> Option<ServiceHandles> {
        self.handles.get().cloned()
    }
}

static GLOBAL_REGISTRY: ServiceRegistry = ServiceRegistry::new();

/// Returns the process-wide service handles, building them on first use.
pub fn get_service_handles<F>(config: &ProviderConfig, build: F) -> ServiceHandles
where
    F: FnOnce(&ProviderConfig) -> ServiceHandles,
{
    GLOBAL_REGISTRY.get_or_init(config, build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryIdentityProvider, InMemoryRecordStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn in_memory_handles(_: &ProviderConfig) -> ServiceHandles {
        ServiceHandles::new(
            Arc::new(InMemoryIdentityProvider::new()),
            Arc::new(InMemoryRecordStore::new()),
        )
    }

    #[test]
    fn registry_builds_once() {
        let registry = ServiceRegistry::new();
        let builds = AtomicUsize::new(0);
        let config = ProviderConfig::new("key", "demo.example.com", "demo");

        let first = registry.get_or_init(&config, |c| {
            builds.fetch_add(1, Ordering::SeqCst);
            in_memory_handles(c)
        });
        let second = registry.get_or_init(&config, |c| {
            builds.fetch_add(1, Ordering::SeqCst);
            in_memory_handles(c)
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.identity(), &second.identity()));
        assert!(Arc::ptr_eq(&first.records(), &second.records()));
    }

    #[test]
    fn empty_registry_has_no_handles() {
        assert!(ServiceRegistry::new().get().is_none());
    }

    #[test]
    fn global_registry_is_idempotent() {
        let config = ProviderConfig::new("key", "demo.example.com", "demo");
        let first = get_service_handles(&config, in_memory_handles);
        let second = get_service_handles(&ProviderConfig::default(), in_memory_handles);
        assert!(Arc::ptr_eq(&first.records(), &second.records()));
    }

    #[test]
    fn missing_required_lists_empty_values() {
        let config = ProviderConfig::new("", "demo.example.com", " ");
        assert_eq!(config.missing_required(), vec!["api_key", "project_id"]);
        assert!(
            ProviderConfig::new("k", "d", "p")
                .missing_required()
                .is_empty()
        );
    }

    #[test]
    fn builders_set_optional_values() {
        let config = ProviderConfig::new("k", "d", "p")
            .with_storage_bucket("p.appspot.com")
            .with_messaging_sender_id("1234")
            .with_app_id("1:1234:web:abcd");
        assert_eq!(config.storage_bucket(), "p.appspot.com");
        assert_eq!(config.messaging_sender_id(), "1234");
        assert_eq!(config.app_id(), "1:1234:web:abcd");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ProviderConfig::new("super-secret", "d", "p");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"project_id": "demo"}"#).expect("deserialize");
        assert_eq!(config.project_id(), "demo");
        assert_eq!(config.missing_required(), vec!["api_key", "auth_domain"]);
    }
}
