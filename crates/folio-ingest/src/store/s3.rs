//! S3-backed object store
//!
//! Layout inside the bucket:
//!
//! - `objects/<id>.json` entity records
//! - `content/<unit>/<file name>` binary content, stored as given
//! - `members/<work>/<position>` one object per membership slot, body is the
//!   member id

use anyhow::Result;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{http::HttpResponse, retry::RetryConfig, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, entity_key, member_key, members_prefix, ObjectStore};
use crate::error::{classify_status, StoreError};
use crate::graph::{EntityId, EntityRecord};

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let builder = match config.static_credentials() {
            Some((access_key, secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "folio-storage");
                aws_sdk_s3::Config::builder().credentials_provider(credentials)
            },
            None => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        // Retries belong to the persistence gateway, which sees every failure.
        let mut s3_config_builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style)
            .retry_config(RetryConfig::disabled());

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Object store initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    #[instrument(skip(self, data))]
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify_sdk_error("put object", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error("get object", e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::transient("read object body", e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    /// Every key under a prefix, following continuation tokens
    #[instrument(skip(self))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify_sdk_error("list objects", e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

/// Map an SDK failure onto the store taxonomy
///
/// Timeouts, dispatch failures and unreadable responses are transient;
/// service errors are judged by HTTP status and error code.
fn classify_sdk_error<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::transient(operation, message)
        },
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let code = service.err().code().unwrap_or("Unknown");
            classify_status(operation, status, &format!("{}: {}", code, message))
        },
        _ => StoreError::rejected(operation, None, message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_entity(&self, record: &EntityRecord) -> Result<EntityId, StoreError> {
        let json = serde_json::to_vec(record)?;
        self.put_object(&entity_key(record.id()), json, "application/json")
            .await?;
        Ok(record.id().clone())
    }

    async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError> {
        let data = self.get_object(&entity_key(id)).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn put_content(&self, key: &str, data: &[u8], mime_type: &str) -> Result<(), StoreError> {
        self.put_object(key, data.to_vec(), mime_type).await
    }

    async fn get_content(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get_object(key).await
    }

    async fn set_member(
        &self,
        work: &EntityId,
        position: usize,
        member: &EntityId,
    ) -> Result<(), StoreError> {
        self.put_object(
            &member_key(work, position),
            member.as_str().as_bytes().to_vec(),
            "text/plain",
        )
        .await
    }

    async fn member_ids(&self, work: &EntityId) -> Result<Vec<EntityId>, StoreError> {
        let mut keys = self.list_keys(&members_prefix(work)).await?;
        keys.sort();

        let mut members = Vec::with_capacity(keys.len());
        for key in keys {
            let body = self.get_object(&key).await?;
            let id = String::from_utf8(body)
                .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;
            members.push(EntityId::from(id.trim()));
        }
        Ok(members)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list_keys("objects/").await?.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::graph::{ViewingDirection, Visibility, Work};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_for(server: &MockServer) -> S3ObjectStore {
        S3ObjectStore::new(StorageConfig::for_minio(server.uri(), "test-bucket"))
            .await
            .unwrap()
    }

    fn s3_error(code: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
            code, code
        )
    }

    fn work() -> EntityRecord {
        EntityRecord::Work(Work {
            id: "w1".into(),
            title: vec!["Work".to_string()],
            visibility: Visibility::Open,
            viewing_direction: ViewingDirection::RightToLeft,
            ordered_member_ids: vec!["r1".into()],
            member_of_collections: Vec::new(),
            replaces: None,
        })
    }

    #[tokio::test]
    async fn test_put_and_get_entity() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/test-bucket/objects/w1.json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/test-bucket/objects/w1.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(serde_json::to_vec(&work()).unwrap()),
            )
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert_eq!(store.put_entity(&work()).await.unwrap(), EntityId::from("w1"));
        assert_eq!(store.get_entity(&"w1".into()).await.unwrap(), work());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test-bucket/objects/missing.json"))
            .respond_with(ResponseTemplate::new(404).set_body_string(s3_error("NoSuchKey")))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store.get_entity(&"missing".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_service_unavailable_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string(s3_error("SlowDown")))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store
            .put_content("content/u1/p1.tif", b"II*\0", "image/tiff")
            .await
            .unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_access_denied_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string(s3_error("AccessDenied")))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store.put_entity(&work()).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: Some(403), .. }), "got {err:?}");
    }
}
