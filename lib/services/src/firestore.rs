//! Record store backed by the hosted Firestore REST API.
//!
//! Documents travel as Firestore typed values (`{"stringValue": "..."}`);
//! this module converts between those and plain JSON so the rest of
//! gatehouse only ever sees [`Fields`].

use crate::bootstrap::ProviderConfig;
use crate::error::StoreError;
use crate::store::{Document, Fields, Filter, RecordStore};
use async_trait::async_trait;
use gatehouse_core::{DocumentId, Result};
use reqwest::{IntoUrl, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue, json};
use tracing::{debug, instrument};

const DEFAULT_API_ROOT: &str = "https://firestore.googleapis.com/v1";
const LIST_PAGE_SIZE: &str = "300";

/// A [`RecordStore`] talking to Firestore over HTTPS.
#[derive(Debug, Clone)]
pub struct FirestoreRecordStore {
    http: reqwest::Client,
    api_root: String,
    project_id: String,
    api_key: String,
    bearer_token: Option<String>,
}

impl FirestoreRecordStore {
    /// Creates a store for the given project's default database.
    #[must_use]
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_root: DEFAULT_API_ROOT.to_string(),
            project_id: project_id.into(),
            api_key: api_key.into(),
            bearer_token: None,
        }
    }

    /// Creates a store from provider configuration.
    #[must_use]
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.project_id(), config.api_key())
    }

    /// Points the store at a different API root, such as a local emulator.
    #[must_use]
    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into().trim_end_matches('/').to_string();
        self
    }

    /// Sends the given ID token with every request, for databases whose
    /// security rules require an authenticated caller.
    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    /// Returns the URL of the database's document root.
    #[must_use]
    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.api_root, self.project_id
        )
    }

    /// Returns the URL of a collection or document below the document root.
    ///
    /// Each segment is percent-encoded, so an id containing `/` cannot
    /// address a different path. Empty, `.` and `..` segments are rejected.
    fn resource_url(&self, segments: &[&str]) -> std::result::Result<Url, String> {
        let mut url = Url::parse(&self.documents_url()).map_err(|e| e.to_string())?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| format!("API root '{}' cannot be a base URL", self.api_root))?;
            for segment in segments {
                if segment.is_empty() || *segment == "." || *segment == ".." {
                    return Err(format!("invalid path segment '{segment}'"));
                }
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if !self.api_key.is_empty() {
            request = request.query(&[("key", self.api_key.as_str())]);
        }
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T, F>(&self, request: RequestBuilder, failure: F) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(String) -> StoreError,
    {
        let response = request
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?
            .error_for_status()
            .map_err(|e| failure(e.to_string()))?;
        let body = response
            .json::<T>()
            .await
            .map_err(|e| failure(format!("unreadable response: {e}")))?;
        Ok(body)
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = self
            .resource_url(&[collection])
            .map_err(|reason| StoreError::QueryFailed {
                collection: collection.to_string(),
                reason,
            })?;
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request(Method::GET, url.clone())
                .query(&[("pageSize", LIST_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListDocumentsResponse = self
                .send(request, |reason| StoreError::QueryFailed {
                    collection: collection.to_string(),
                    reason,
                })
                .await?;

            for raw in page.documents {
                documents.push(raw.into_document()?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn run_query(
        &self,
        collection: &str,
        field: &str,
        value: &JsonValue,
    ) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}:runQuery", self.documents_url());
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }
            }
        });

        let rows: Vec<RunQueryRow> = self
            .send(
                self.request(Method::POST, url.as_str()).json(&body),
                |reason| StoreError::QueryFailed {
                    collection: collection.to_string(),
                    reason,
                },
            )
            .await?;

        // runQuery emits rows without a document to report progress.
        rows.into_iter()
            .filter_map(|row| row.document)
            .map(RawDocument::into_document)
            .collect()
    }
}

#[async_trait]
impl RecordStore for FirestoreRecordStore {
    #[instrument(skip(self, filter))]
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let documents = match filter {
            Filter::All => self.list_documents(collection).await?,
            Filter::FieldEquals { field, value } => {
                self.run_query(collection, field, value).await?
            }
        };
        debug!(count = documents.len(), "query returned documents");
        Ok(documents)
    }

    #[instrument(skip(self, fields))]
    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        let url = self
            .resource_url(&[collection])
            .map_err(|reason| StoreError::InsertFailed {
                collection: collection.to_string(),
                reason,
            })?;
        let body = json!({ "fields": encode_fields(&fields) });

        let created: RawDocument = self
            .send(self.request(Method::POST, url).json(&body), |reason| {
                StoreError::InsertFailed {
                    collection: collection.to_string(),
                    reason,
                }
            })
            .await?;

        let id = DocumentId::new(created.id());
        debug!(%id, "document created");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        let failure = |reason| StoreError::DeleteFailed {
            collection: collection.to_string(),
            id: id.to_string(),
            reason,
        };
        let url = self
            .resource_url(&[collection, id.as_str()])
            .map_err(failure)?;
        let _: JsonValue = self
            .send(self.request(Method::DELETE, url), failure)
            .await?;

        debug!("document deleted");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryRow {
    document: Option<RawDocument>,
}

/// A document as Firestore returns it: full resource name plus typed fields.
#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, JsonValue>,
}

impl RawDocument {
    /// The document id is the last segment of the resource name.
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn into_document(self) -> Result<Document, StoreError> {
        let id = DocumentId::new(self.id());
        let fields = decode_fields(&self.fields)?;
        Ok(Document::new(id, fields))
    }
}

/// Encodes plain JSON fields as Firestore typed values.
#[must_use]
pub fn encode_fields(fields: &Fields) -> JsonValue {
    let encoded: Map<String, JsonValue> = fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect();
    JsonValue::Object(encoded)
}

/// Encodes one JSON value as a Firestore typed value.
#[must_use]
pub fn encode_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({ "nullValue": null }),
        JsonValue::Bool(b) => json!({ "booleanValue": b }),
        JsonValue::Number(n) => match n.as_i64() {
            // Firestore carries 64-bit integers as strings.
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        JsonValue::String(s) => json!({ "stringValue": s }),
        JsonValue::Array(items) => {
            let values: Vec<JsonValue> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        JsonValue::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Decodes Firestore typed fields into plain JSON fields.
///
/// # Errors
///
/// Returns an error if any field is not a recognizable typed value.
pub fn decode_fields(fields: &Map<String, JsonValue>) -> Result<Fields, StoreError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

/// Decodes one Firestore typed value into plain JSON.
///
/// Timestamps, references and bytes decode to their string form.
///
/// # Errors
///
/// Returns an error if the value is not a recognizable typed value.
pub fn decode_value(value: &JsonValue) -> Result<JsonValue, StoreError> {
    let malformed = |reason: String| StoreError::MalformedDocument { reason };

    let Some((kind, inner)) = value.as_object().and_then(|map| map.iter().next()) else {
        return Err(malformed(format!("expected a typed value, got {value}")).into());
    };

    let decoded = match kind.as_str() {
        "nullValue" => JsonValue::Null,
        "booleanValue" | "doubleValue" | "geoPointValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "integerValue" => match inner {
            JsonValue::String(s) => s
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|e| malformed(format!("bad integerValue '{s}': {e}")))?,
            other => other.clone(),
        },
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(JsonValue::as_array)
                .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            JsonValue::Array(items)
        }
        "mapValue" => {
            let fields = match inner.get("fields").and_then(JsonValue::as_object) {
                Some(fields) => decode_fields(fields)?,
                None => Fields::new(),
            };
            JsonValue::Object(fields)
        }
        other => return Err(malformed(format!("unknown value type '{other}'")).into()),
    };

    Ok(decoded)
}
