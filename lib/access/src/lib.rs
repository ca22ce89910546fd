//! Allow-list gating and session lifecycle.
//!
//! This crate decides who may use the application once the identity
//! provider has authenticated them, and keeps the session state the rest of
//! the application observes.
//!
//! # Components
//!
//! - [`AllowListGate`]: membership checks and admin operations over the
//!   allow-list collection
//! - [`SessionController`]: sign-in, sign-out, identity notifications and
//!   TTL enforcement
//! - [`SessionState`]: the observable state and its pure transitions
//!
//! # Example
//!
//! ```
//! use gatehouse_access::{AllowListConfig, AllowListGate, SessionConfig, SessionController};
//! use gatehouse_services::{InMemoryIdentityProvider, InMemoryRecordStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryRecordStore::new());
//! let gate = AllowListGate::new(store, &AllowListConfig::default());
//! let controller = SessionController::new(
//!     Arc::new(InMemoryIdentityProvider::new()),
//!     gate,
//!     SessionConfig::default(),
//! );
//! assert!(controller.loading());
//! assert!(!controller.is_authenticated());
//! ```

pub mod allow_list;
pub mod config;
pub mod controller;
pub mod error;
pub mod session;

pub use allow_list::{AllowListEntry, AllowListGate, AllowListRecord};
pub use config::{AllowListConfig, SessionConfig};
pub use controller::{SessionController, SessionGuard};
pub use error::AccessError;
pub use session::{AllowDecision, Expiry, ExpiryCheck, IdentityChange, SessionState};
