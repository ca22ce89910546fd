//! External service contracts for gatehouse.
//!
//! Gatehouse does not authenticate anyone or store anything itself. This
//! crate describes the two external collaborators it orchestrates and how
//! handles to them are built:
//!
//! - [`IdentityProvider`]: interactive sign-in, sign-out, and a stream of
//!   identity changes
//! - [`RecordStore`]: query/insert/delete over document collections
//! - [`bootstrap`]: builds and memoizes [`ServiceHandles`] from
//!   [`ProviderConfig`]
//!
//! [`FirestoreRecordStore`] is the hosted record store; the in-memory
//! implementations serve tests and local development.
//!
//! # Example
//!
//! ```
//! use gatehouse_services::{
//!     InMemoryIdentityProvider, InMemoryRecordStore, ProviderConfig, ServiceHandles,
//!     ServiceRegistry,
//! };
//! use std::sync::Arc;
//!
//! let registry = ServiceRegistry::new();
//! let config = ProviderConfig::new("api-key", "demo.firebaseapp.com", "demo");
//! let handles = registry.get_or_init(&config, |_| {
//!     ServiceHandles::new(
//!         Arc::new(InMemoryIdentityProvider::new()),
//!         Arc::new(InMemoryRecordStore::new()),
//!     )
//! });
//!
//! assert!(registry.get().is_some());
//! # drop(handles);
//! ```

pub mod bootstrap;
pub mod error;
pub mod firestore;
pub mod identity;
pub mod memory;
pub mod store;

pub use bootstrap::{ProviderConfig, ServiceHandles, ServiceRegistry, get_service_handles};
pub use error::{ProviderError, StoreError};
pub use firestore::FirestoreRecordStore;
pub use identity::{Identity, IdentityProvider, IdentityWatch};
pub use memory::{InMemoryIdentityProvider, InMemoryRecordStore};
pub use store::{Document, Fields, Filter, RecordStore};
