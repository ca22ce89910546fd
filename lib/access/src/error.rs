//! Error types for the access crate.
//!
//! `AccessError` is the context callers see. Failures from the identity
//! provider or the record store arrive as their own reports and are wrapped
//! with `.context(AccessError::...)` so the original cause stays attached.

use std::fmt;

/// Errors from allow-list and session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The identity authenticated with the provider but is not on the
    /// allow-list. `message` is meant to be shown to the user.
    Unauthorized { message: String },
    /// A call to the identity provider failed.
    ProviderFailure { operation: String },
    /// A call to the record store failed.
    StoreFailure { operation: String },
    /// Another sign-in or sign-out is still in flight.
    OperationInProgress,
}

impl AccessError {
    /// Returns true if this is an allow-list rejection.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns the text suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { message } => write!(f, "{message}"),
            Self::ProviderFailure { operation } => {
                write!(f, "identity provider {operation} failed")
            }
            Self::StoreFailure { operation } => {
                write!(f, "allow-list {operation} failed")
            }
            Self::OperationInProgress => {
                write!(f, "another sign-in or sign-out is already in progress")
            }
        }
    }
}

impl std::error::Error for AccessError {}
