//! Record store contract.
//!
//! The hosted document database owns consistency, indexing and network
//! retries. Gatehouse needs three operations from it: query a collection,
//! insert a document, and delete a document by id.

use crate::error::StoreError;
use async_trait::async_trait;
use gatehouse_core::{DocumentId, Result};
use serde_json::{Map, Value as JsonValue};

/// Field map of a stored document.
pub type Fields = Map<String, JsonValue>;

/// A document read back from the store, with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Document fields.
    pub fields: Fields,
}

impl Document {
    /// Creates a document.
    #[must_use]
    pub fn new(id: DocumentId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Returns a string field, if present and a string.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(JsonValue::as_str)
    }
}

/// Filter applied to a collection query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document in the collection.
    All,
    /// Documents whose `field` equals `value`.
    FieldEquals { field: String, value: JsonValue },
}

impl Filter {
    /// Creates an equality filter.
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns true if the given fields satisfy this filter.
    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::All => true,
            Self::FieldEquals { field, value } => fields.get(field) == Some(value),
        }
    }
}

/// Operations gatehouse performs against the external record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the documents in `collection` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be executed.
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Inserts a new document and returns the id the store assigned.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected.
    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError>;

    /// Deletes the document with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected.
    async fn delete_by_id(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: JsonValue) -> Fields {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn all_matches_everything() {
        assert!(Filter::All.matches(&Fields::new()));
        assert!(Filter::All.matches(&fields(json!({"email": "a@b.c"}))));
    }

    #[test]
    fn field_equals_matches_exact_value() {
        let filter = Filter::field_equals("email", "a@b.c");
        assert!(filter.matches(&fields(json!({"email": "a@b.c", "name": "A"}))));
        assert!(!filter.matches(&fields(json!({"email": "A@B.C"}))));
        assert!(!filter.matches(&fields(json!({"name": "a@b.c"}))));
    }

    #[test]
    fn str_field_ignores_non_strings() {
        let doc = Document::new(
            DocumentId::new("d1"),
            fields(json!({"email": "a@b.c", "count": 3})),
        );
        assert_eq!(doc.str_field("email"), Some("a@b.c"));
        assert_eq!(doc.str_field("count"), None);
        assert_eq!(doc.str_field("missing"), None);
    }
}
