//! In-memory service implementations.
//!
//! These stand in for the hosted identity provider and record store in
//! tests and local development. Both support failure injection so callers
//! can exercise fail-closed and propagate paths.

use crate::error::{ProviderError, StoreError};
use crate::identity::{Identity, IdentityProvider, IdentityWatch};
use crate::store::{Document, Fields, Filter, RecordStore};
use async_trait::async_trait;
use gatehouse_core::{DocumentId, Result};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use ulid::Ulid;

type Collections = HashMap<String, BTreeMap<DocumentId, Fields>>;

/// A record store held entirely in memory.
///
/// Clones share the same underlying collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    collections: Arc<Mutex<Collections>>,
    failing: Arc<AtomicBool>,
    queries: Arc<AtomicUsize>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns how many queries have been executed.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Returns a copy of every document in a collection.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let collections = self.lock();
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.is_failing() {
            return Err(StoreError::QueryFailed {
                collection: collection.to_string(),
                reason: "store unavailable".to_string(),
            }
            .into());
        }

        let collections = self.lock();
        let docs = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| filter.matches(fields))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        if self.is_failing() {
            return Err(StoreError::InsertFailed {
                collection: collection.to_string(),
                reason: "store unavailable".to_string(),
            }
            .into());
        }

        let id = DocumentId::new(Ulid::new().to_string());
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn delete_by_id(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        if self.is_failing() {
            return Err(StoreError::DeleteFailed {
                collection: collection.to_string(),
                id: id.to_string(),
                reason: "store unavailable".to_string(),
            }
            .into());
        }

        // Deleting a missing document succeeds, matching the hosted store.
        if let Some(docs) = self.lock().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

/// An identity provider driven by scripted outcomes.
///
/// Each call to [`IdentityProvider::sign_in_interactive`] consumes the next
/// scripted outcome. [`restore`](Self::restore) publishes an identity the
/// way a provider does when it resumes a persisted session.
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    current: watch::Sender<Option<Identity>>,
    scripted: Mutex<VecDeque<std::result::Result<Identity, ProviderError>>>,
    sign_outs: AtomicUsize,
    fail_sign_out: AtomicBool,
}

impl InMemoryIdentityProvider {
    /// Creates a provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            scripted: Mutex::new(VecDeque::new()),
            sign_outs: AtomicUsize::new(0),
            fail_sign_out: AtomicBool::new(false),
        }
    }

    /// Queues an identity to be returned by the next interactive sign-in.
    pub fn script_sign_in(&self, identity: Identity) {
        self.lock_script().push_back(Ok(identity));
    }

    /// Queues a failure for the next interactive sign-in.
    pub fn script_sign_in_failure(&self, error: ProviderError) {
        self.lock_script().push_back(Err(error));
    }

    /// Makes sign-out fail (or succeed again).
    pub fn set_sign_out_failing(&self, failing: bool) {
        self.fail_sign_out.store(failing, Ordering::SeqCst);
    }

    /// Publishes an identity without interactive sign-in.
    pub fn restore(&self, identity: Identity) {
        self.current.send_replace(Some(identity));
    }

    /// Publishes "signed out" without a sign-out call, as happens when the
    /// session ends elsewhere.
    pub fn drop_identity(&self) {
        self.current.send_replace(None);
    }

    /// Returns the identity the provider currently considers signed in.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// Returns how many sign-outs have succeeded.
    #[must_use]
    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    fn lock_script(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<std::result::Result<Identity, ProviderError>>> {
        self.scripted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_in_interactive(&self) -> Result<Identity, ProviderError> {
        let outcome = self.lock_script().pop_front();
        match outcome {
            Some(Ok(identity)) => {
                self.current.send_replace(Some(identity.clone()));
                Ok(identity)
            }
            Some(Err(error)) => Err(error.into()),
            None => Err(ProviderError::SignInFailed {
                reason: "no sign-in outcome scripted".to_string(),
            }
            .into()),
        }
    }

    async fn sign_out_current(&self) -> Result<(), ProviderError> {
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(ProviderError::SignOutFailed {
                reason: "provider unreachable".to_string(),
            }
            .into());
        }
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> IdentityWatch {
        self.current.subscribe()
    }
}
