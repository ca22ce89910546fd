//! Allow-list gate.
//!
//! The allow-list is a collection of pre-approved email addresses in the
//! record store. The gate answers "may this identity use the application"
//! and offers the admin operations over the list.
//!
//! Failure policy differs per operation:
//! - [`AllowListGate::is_allowed`] fails closed: a lookup error denies access
//! - [`AllowListGate::list_all`] fails open: a read error yields an empty list
//! - [`AllowListGate::add`] and [`AllowListGate::remove`] propagate errors

use crate::config::AllowListConfig;
use crate::error::AccessError;
use chrono::{SecondsFormat, Utc};
use gatehouse_core::{DocumentId, Result, normalize_email};
use gatehouse_services::{Document, Fields, Filter, Identity, RecordStore, ServiceHandles};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

const EMAIL_FIELD: &str = "email";
const NAME_FIELD: &str = "name";
const CREATED_AT_FIELD: &str = "createdAt";

/// The persisted shape of an allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowListRecord {
    /// Normalized email address.
    pub email: String,
    /// Display name; the email when none was given.
    pub name: String,
    /// Creation time as an ISO-8601 string.
    pub created_at: String,
}

impl AllowListRecord {
    /// Builds a record for `email`, normalizing it and stamping the
    /// current time. A missing or blank `name` defaults to the normalized
    /// email.
    #[must_use]
    pub fn new(email: &str, name: Option<&str>) -> Self {
        let email = normalize_email(email);
        let name = name
            .filter(|name| !name.trim().is_empty())
            .map_or_else(|| email.clone(), str::to_string);
        Self {
            email,
            name,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Converts the record into store fields, using its serialized shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not serialize to a JSON object.
    pub fn into_fields(self) -> std::result::Result<Fields, serde_json::Error> {
        match serde_json::to_value(self)? {
            JsonValue::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!(
                "allow-list record serialized to {other}, expected an object"
            ))),
        }
    }
}

/// An allow-list entry as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowListEntry {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Email address as stored.
    pub email: String,
    /// Display name; falls back to the email when the document has none.
    pub name: String,
    /// Creation time as stored (empty if the document has none).
    pub created_at: String,
}

impl From<Document> for AllowListEntry {
    fn from(document: Document) -> Self {
        let email = document.str_field(EMAIL_FIELD).unwrap_or_default().to_string();
        let name = document
            .str_field(NAME_FIELD)
            .map_or_else(|| email.clone(), str::to_string);
        let created_at = document
            .str_field(CREATED_AT_FIELD)
            .unwrap_or_default()
            .to_string();
        Self {
            id: document.id,
            email,
            name,
            created_at,
        }
    }
}

/// Decides allow-list membership and manages allow-list entries.
#[derive(Clone)]
pub struct AllowListGate {
    records: Arc<dyn RecordStore>,
    collection: String,
}

impl AllowListGate {
    /// Creates a gate over the given record store.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, config: &AllowListConfig) -> Self {
        Self {
            records,
            collection: config.collection().to_string(),
        }
    }

    /// Creates a gate over the record store in `handles`.
    #[must_use]
    pub fn from_handles(handles: &ServiceHandles, config: &AllowListConfig) -> Self {
        Self::new(handles.records(), config)
    }

    /// Returns the collection this gate reads and writes.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns true if the identity's email is on the allow-list.
    ///
    /// Absent identities and identities without an email are denied without
    /// contacting the store. Lookup failures are logged and deny access.
    #[instrument(skip_all, fields(collection = %self.collection))]
    pub async fn is_allowed(&self, identity: Option<&Identity>) -> bool {
        let Some(identity) = identity else {
            return false;
        };
        let Some(email) = identity.normalized_email() else {
            debug!(uid = identity.uid(), "identity has no email; denying");
            return false;
        };

        let filter = Filter::field_equals(EMAIL_FIELD, email.as_str());
        match self.records.query(&self.collection, &filter).await {
            Ok(matches) => {
                debug!(matches = matches.len(), "allow-list lookup complete");
                !matches.is_empty()
            }
            Err(report) => {
                error!(
                    error = %report,
                    email = identity.email().unwrap_or_default(),
                    "allow-list lookup failed; denying access"
                );
                false
            }
        }
    }

    /// Returns every allow-list entry, or an empty list if the store
    /// cannot be read.
    #[instrument(skip_all, fields(collection = %self.collection))]
    pub async fn list_all(&self) -> Vec<AllowListEntry> {
        match self.records.query(&self.collection, &Filter::All).await {
            Ok(documents) => documents.into_iter().map(AllowListEntry::from).collect(),
            Err(report) => {
                error!(error = %report, "listing allow-list entries failed");
                Vec::new()
            }
        }
    }

    /// Adds `email` to the allow-list and returns the new entry's id.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if the store rejects the write.
    #[instrument(skip_all, fields(collection = %self.collection))]
    pub async fn add(&self, email: &str, name: Option<&str>) -> Result<DocumentId, AccessError> {
        let record = AllowListRecord::new(email, name);
        let normalized = record.email.clone();
        let fields = record.into_fields().map_err(|e| {
            error!(error = %e, email = %normalized, "encoding allow-list entry failed");
            AccessError::StoreFailure {
                operation: "add".to_string(),
            }
        })?;

        match self.records.insert(&self.collection, fields).await {
            Ok(id) => {
                info!(%id, email = %normalized, "allow-list entry added");
                Ok(id)
            }
            Err(report) => {
                error!(error = %report, email = %normalized, "adding allow-list entry failed");
                Err(report.context(AccessError::StoreFailure {
                    operation: "add".to_string(),
                }))
            }
        }
    }

    /// Removes the entry with the given id.
    ///
    /// # Errors
    ///
    /// Returns `StoreFailure` if the store rejects the delete.
    #[instrument(skip_all, fields(collection = %self.collection, id = %id))]
    pub async fn remove(&self, id: &DocumentId) -> Result<(), AccessError> {
        match self.records.delete_by_id(&self.collection, id).await {
            Ok(()) => {
                info!("allow-list entry removed");
                Ok(())
            }
            Err(report) => {
                error!(error = %report, "removing allow-list entry failed");
                Err(report.context(AccessError::StoreFailure {
                    operation: "remove".to_string(),
                }))
            }
        }
    }
}

impl std::fmt::Debug for AllowListGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowListGate")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_services::InMemoryRecordStore;
    use std::collections::HashSet;

    fn gate() -> (AllowListGate, InMemoryRecordStore) {
        let store = InMemoryRecordStore::new();
        let gate = AllowListGate::new(Arc::new(store.clone()), &AllowListConfig::default());
        (gate, store)
    }

    fn identity(email: Option<&str>) -> Identity {
        Identity::new("uid_1", email.map(str::to_string))
    }

    #[tokio::test]
    async fn absent_identity_is_denied_without_query() {
        let (gate, store) = gate();
        assert!(!gate.is_allowed(None).await);
        assert!(!gate.is_allowed(Some(&identity(None))).await);
        assert!(!gate.is_allowed(Some(&identity(Some("  ")))).await);
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn listed_email_is_allowed() {
        let (gate, _store) = gate();
        gate.add("alice@example.com", None).await.expect("add");

        assert!(gate.is_allowed(Some(&identity(Some("alice@example.com")))).await);
        assert!(!gate.is_allowed(Some(&identity(Some("bob@example.com")))).await);
    }

    #[tokio::test]
    async fn lookup_normalizes_email() {
        let (gate, _store) = gate();
        gate.add("alice@example.com", None).await.expect("add");

        for email in ["alice@example.com", " ALICE@EXAMPLE.COM ", "Alice@Example.com"] {
            assert!(
                gate.is_allowed(Some(&identity(Some(email)))).await,
                "{email} should be allowed"
            );
        }
        for email in ["carol@example.com", " CAROL@EXAMPLE.COM "] {
            assert!(!gate.is_allowed(Some(&identity(Some(email)))).await);
        }
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed() {
        let (gate, store) = gate();
        gate.add("alice@example.com", None).await.expect("add");
        store.set_failing(true);

        assert!(!gate.is_allowed(Some(&identity(Some("alice@example.com")))).await);
    }

    #[tokio::test]
    async fn add_normalizes_and_defaults_name() {
        let (gate, store) = gate();
        let id = gate.add("Foo@Bar.com", None).await.expect("add");

        let docs = store.documents("allowedUsers");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert_eq!(docs[0].str_field("email"), Some("foo@bar.com"));
        assert_eq!(docs[0].str_field("name"), Some("foo@bar.com"));
        let created_at = docs[0].str_field("createdAt").expect("createdAt");
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
    }

    #[tokio::test]
    async fn add_keeps_explicit_name() {
        let (gate, store) = gate();
        gate.add("foo@bar.com", Some("Foo Bar")).await.expect("add");
        assert_eq!(
            store.documents("allowedUsers")[0].str_field("name"),
            Some("Foo Bar")
        );
    }

    #[tokio::test]
    async fn add_propagates_store_failure() {
        let (gate, store) = gate();
        store.set_failing(true);

        let report = gate.add("foo@bar.com", None).await.expect_err("should fail");
        assert_eq!(
            report.current_context(),
            &AccessError::StoreFailure {
                operation: "add".to_string()
            }
        );
    }

    #[tokio::test]
    async fn remove_then_list_excludes_entry() {
        let (gate, _store) = gate();
        let keep = gate.add("keep@example.com", None).await.expect("add");
        let drop = gate.add("drop@example.com", None).await.expect("add");

        gate.remove(&drop).await.expect("remove");

        let ids: Vec<DocumentId> = gate.list_all().await.into_iter().map(|e| e.id).collect();
        assert!(ids.contains(&keep));
        assert!(!ids.contains(&drop));
    }

    #[tokio::test]
    async fn remove_propagates_store_failure() {
        let (gate, store) = gate();
        let id = gate.add("a@example.com", None).await.expect("add");
        store.set_failing(true);

        let report = gate.remove(&id).await.expect_err("should fail");
        assert!(matches!(
            report.current_context(),
            AccessError::StoreFailure { .. }
        ));
    }

    #[tokio::test]
    async fn list_all_is_stable_on_unchanged_store() {
        let (gate, _store) = gate();
        gate.add("a@example.com", Some("A")).await.expect("add");
        gate.add("b@example.com", None).await.expect("add");

        let first: HashSet<_> = gate
            .list_all()
            .await
            .into_iter()
            .map(|e| (e.id, e.email, e.name, e.created_at))
            .collect();
        let second: HashSet<_> = gate
            .list_all()
            .await
            .into_iter()
            .map(|e| (e.id, e.email, e.name, e.created_at))
            .collect();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn list_all_fails_open_to_empty() {
        let (gate, store) = gate();
        gate.add("a@example.com", None).await.expect("add");
        store.set_failing(true);

        assert!(gate.list_all().await.is_empty());
    }

    #[test]
    fn entry_from_document_without_name_uses_email() {
        let mut fields = Fields::new();
        fields.insert("email".to_string(), JsonValue::from("a@example.com"));
        let entry = AllowListEntry::from(Document::new(DocumentId::new("d1"), fields));
        assert_eq!(entry.name, "a@example.com");
        assert_eq!(entry.created_at, "");
    }

    #[test]
    fn stored_fields_match_serialized_record() {
        let record = AllowListRecord::new("a@example.com", Some("A"));
        let fields = record.clone().into_fields().expect("fields");

        let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["createdAt", "email", "name"]);
        let back: AllowListRecord =
            serde_json::from_value(JsonValue::Object(fields)).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let record = AllowListRecord::new(" Foo@Bar.com ", Some(""));
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["email"], "foo@bar.com");
        assert_eq!(json["name"], "foo@bar.com");
        assert!(json.get("createdAt").is_some());
    }
}
