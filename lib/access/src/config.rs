//! Session and allow-list configuration.
//!
//! Fields with defaults can be omitted when loading from environment
//! variables.

use chrono::Duration;
use serde::{Deserialize, Serialize};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Default maximum session age, in hours.
pub const DEFAULT_SESSION_TTL_HOURS: f64 = 24.0;

/// Default collection holding allow-list entries.
pub const DEFAULT_ALLOW_LIST_COLLECTION: &str = "allowedUsers";

/// Configuration of the session lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum session age in hours before a forced sign-out.
    /// Zero, negative or non-finite values fall back to the default.
    /// Default: 24
    #[serde(default = "default_ttl_hours")]
    ttl_hours: f64,
    /// Period of the background expiry check, in milliseconds.
    /// Default: 60000
    #[serde(default = "default_expiry_check_interval_ms")]
    expiry_check_interval_ms: u64,
    /// Message returned to a user who signed in but is not on the
    /// allow-list.
    #[serde(default = "default_unauthorized_message")]
    unauthorized_message: String,
}

fn default_ttl_hours() -> f64 {
    DEFAULT_SESSION_TTL_HOURS
}

fn default_expiry_check_interval_ms() -> u64 {
    60_000
}

fn default_unauthorized_message() -> String {
    "Du har ikke tilgang til denne applikasjonen. Kontakt administrator.".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            expiry_check_interval_ms: default_expiry_check_interval_ms(),
            unauthorized_message: default_unauthorized_message(),
        }
    }
}

impl SessionConfig {
    /// Sets the maximum session age. Values below 1 ms are clamped to 1 ms.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_hours = ttl.num_milliseconds().max(1) as f64 / MILLIS_PER_HOUR;
        self
    }

    /// Sets the period of the background expiry check.
    #[must_use]
    pub fn with_expiry_check_interval(mut self, interval: std::time::Duration) -> Self {
        self.expiry_check_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the message shown to users who are not on the allow-list.
    #[must_use]
    pub fn with_unauthorized_message(mut self, message: impl Into<String>) -> Self {
        self.unauthorized_message = message.into();
        self
    }

    /// Returns the maximum session age.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        let hours = if self.ttl_hours.is_finite() && self.ttl_hours > 0.0 {
            self.ttl_hours
        } else {
            DEFAULT_SESSION_TTL_HOURS
        };
        Duration::milliseconds((hours * MILLIS_PER_HOUR).round() as i64)
    }

    /// Returns the period of the background expiry check (at least 1 ms).
    #[must_use]
    pub fn expiry_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.expiry_check_interval_ms.max(1))
    }

    /// Returns the message shown to users who are not on the allow-list.
    #[must_use]
    pub fn unauthorized_message(&self) -> &str {
        &self.unauthorized_message
    }
}

/// Configuration of the allow-list storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListConfig {
    /// Collection holding allow-list entries.
    /// Default: "allowedUsers"
    #[serde(default = "default_collection")]
    collection: String,
}

fn default_collection() -> String {
    DEFAULT_ALLOW_LIST_COLLECTION.to_string()
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

impl AllowListConfig {
    /// Creates a configuration using the given collection.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}
