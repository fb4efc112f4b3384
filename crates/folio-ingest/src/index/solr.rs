//! Solr search index over HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{SearchDocument, SearchIndex};
use crate::error::{classify_status, StoreError};

/// A single Solr core, e.g. `http://localhost:8983/solr/folio`
pub struct SolrIndex {
    client: Client,
    core_url: Url,
}

#[derive(Debug, Deserialize)]
struct RealtimeGet {
    doc: Option<SearchDocument>,
}

impl SolrIndex {
    pub fn new(core_url: Url, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Folio-Ingest/1.0")
            .build()
            .map_err(|e| StoreError::rejected("build search client", None, e.to_string()))?;

        Ok(Self { client, core_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.core_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::rejected("build url", None, self.core_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(operation: &str, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(operation, status.as_u16(), &body))
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        StoreError::transient(operation, err.to_string())
    } else {
        StoreError::rejected(operation, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

#[async_trait]
impl SearchIndex for SolrIndex {
    #[instrument(skip(self, document), fields(id = %document.id))]
    async fn add(&self, document: &SearchDocument) -> Result<(), StoreError> {
        let url = self.endpoint(&["update", "json", "docs"])?;
        debug!(%url, "Indexing document");

        let response = self
            .client
            .post(url)
            .json(document)
            .send()
            .await
            .map_err(|e| transport_error("index add", e))?;
        Self::check("index add", response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn commit(&self) -> Result<(), StoreError> {
        let mut url = self.endpoint(&["update"])?;
        url.query_pairs_mut().append_pair("commit", "true");

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| transport_error("index commit", e))?;
        Self::check("index commit", response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<SearchDocument>, StoreError> {
        let mut url = self.endpoint(&["get"])?;
        url.query_pairs_mut().append_pair("id", id);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error("index get", e))?;
        let response = Self::check("index get", response).await?;

        let body: RealtimeGet = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(body.doc)
    }
}
