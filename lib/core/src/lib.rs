//! Core types and utilities for gatehouse.
//!
//! This crate provides the foundational types shared by the service
//! contracts and the access layer: the error `Result` alias, store-assigned
//! document identifiers, and email normalization.

pub mod email;
pub mod error;
pub mod id;

pub use email::normalize_email;
pub use error::Result;
pub use id::DocumentId;
