//! Identity provider contract.
//!
//! The identity provider performs the actual authentication (interactive
//! sign-in, token issuance, credential storage). This module only describes
//! what gatehouse needs from it: start a sign-in, sign the current identity
//! out, and observe identity changes.

use crate::error::ProviderError;
use async_trait::async_trait;
use gatehouse_core::{Result, normalize_email};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The principal currently signed in at the identity provider.
///
/// Identities are owned by the provider; gatehouse keeps a copy that
/// mirrors the provider's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-assigned unique identifier.
    uid: String,
    /// Email address as reported by the provider, if any.
    email: Option<String>,
    /// Display name as reported by the provider, if any.
    display_name: Option<String>,
}

impl Identity {
    /// Creates an identity with the given provider uid and email.
    #[must_use]
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
            display_name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    /// Returns the provider-assigned uid.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Returns the email exactly as the provider reported it.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the display name, if available.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the lower-cased, trimmed email, or `None` when the provider
    /// supplied no usable address.
    #[must_use]
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
    }
}

/// Stream of identity changes published by a provider.
///
/// The current value is the provider's present identity (`None` when signed
/// out). Dropping the receiver unsubscribes.
pub type IdentityWatch = watch::Receiver<Option<Identity>>;

/// Operations gatehouse performs against the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Runs the provider's interactive sign-in flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow fails or is cancelled.
    async fn sign_in_interactive(&self) -> Result<Identity, ProviderError>;

    /// Signs the current identity out at the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the sign-out.
    async fn sign_out_current(&self) -> Result<(), ProviderError>;

    /// Subscribes to identity changes.
    ///
    /// The returned receiver reports the current identity immediately and
    /// every change after that, including identities the provider restores
    /// from an earlier session without going through interactive sign-in.
    fn subscribe(&self) -> IdentityWatch;
}
