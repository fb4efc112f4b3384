//! Bibliographic metadata lookup
//!
//! Resources that name a catalog identifier get their title and descriptive
//! attributes from the catalog's JSON-LD rendering of that record.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::error::LookupError;

/// Fields imported from a catalog record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRecord {
    pub identifier: String,
    pub title: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl RemoteRecord {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: vec![title.into()],
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Read a JSON-LD object: `title` may be a string, a list, or
    /// `{"@value": ...}`; other scalar keys become attributes.
    pub fn from_jsonld(identifier: &str, value: &Value) -> Result<Self, LookupError> {
        let object = value
            .as_object()
            .ok_or_else(|| LookupError::Malformed(format!("record '{}' is not an object", identifier)))?;

        let title = object.get("title").map(literal_values).unwrap_or_default();

        let attributes = object
            .iter()
            .filter(|(key, _)| *key != "title" && !key.starts_with('@'))
            .filter_map(|(key, value)| {
                let values = literal_values(value);
                (!values.is_empty()).then(|| (key.clone(), values.join("; ")))
            })
            .collect();

        Ok(Self {
            identifier: identifier.to_string(),
            title,
            attributes,
        })
    }
}

fn literal_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(literal_values).collect(),
        Value::Object(map) => map.get("@value").map(literal_values).unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[async_trait]
pub trait BibliographicLookup: Send + Sync {
    async fn fetch(&self, identifier: &str) -> Result<RemoteRecord, LookupError>;
}

/// Catalog service reached over HTTP
pub struct HttpBibliographicLookup {
    client: Client,
    base_url: Url,
}

impl HttpBibliographicLookup {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Folio-Ingest/1.0")
            .build()
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn record_url(&self, identifier: &str) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LookupError::Unavailable(format!("cannot build a path on {}", self.base_url)))?
            .pop_if_empty()
            .extend(["bibliographic", identifier, "jsonld"]);
        Ok(url)
    }
}

#[async_trait]
impl BibliographicLookup for HttpBibliographicLookup {
    #[instrument(skip(self))]
    async fn fetch(&self, identifier: &str) -> Result<RemoteRecord, LookupError> {
        let url = self.record_url(identifier)?;
        debug!(%url, "Fetching bibliographic record");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(LookupError::NotFound(identifier.to_string())),
            status if !status.is_success() => {
                return Err(LookupError::Unavailable(format!("HTTP error: {}", status)))
            },
            _ => {},
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;

        RemoteRecord::from_jsonld(identifier, &body)
    }
}

/// Fixed set of records; anything else is not found
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    records: HashMap<String, RemoteRecord>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: RemoteRecord) -> Self {
        self.records.insert(record.identifier.clone(), record);
        self
    }
}

#[async_trait]
impl BibliographicLookup for StaticLookup {
    async fn fetch(&self, identifier: &str) -> Result<RemoteRecord, LookupError> {
        self.records
            .get(identifier)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(identifier.to_string()))
    }
}
