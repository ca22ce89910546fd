//! Error types for the services crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ProviderError`: Identity provider failures (sign-in, sign-out)
//! - `StoreError`: Record store failures (query, insert, delete, decode)

use std::fmt;

/// Errors from identity provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The interactive sign-in flow failed.
    SignInFailed { reason: String },
    /// The user dismissed the interactive sign-in.
    SignInCancelled,
    /// Signing the current identity out failed.
    SignOutFailed { reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignInFailed { reason } => write!(f, "sign-in failed: {reason}"),
            Self::SignInCancelled => write!(f, "sign-in was cancelled"),
            Self::SignOutFailed { reason } => write!(f, "sign-out failed: {reason}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from record store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A query against a collection failed.
    QueryFailed { collection: String, reason: String },
    /// Inserting a document failed.
    InsertFailed { collection: String, reason: String },
    /// Deleting a document failed.
    DeleteFailed {
        collection: String,
        id: String,
        reason: String,
    },
    /// The store returned a document that could not be decoded.
    MalformedDocument { reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryFailed { collection, reason } => {
                write!(f, "query on '{collection}' failed: {reason}")
            }
            Self::InsertFailed { collection, reason } => {
                write!(f, "insert into '{collection}' failed: {reason}")
            }
            Self::DeleteFailed {
                collection,
                id,
                reason,
            } => {
                write!(f, "delete of '{collection}/{id}' failed: {reason}")
            }
            Self::MalformedDocument { reason } => {
                write!(f, "malformed document: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
