//! S3-compatible durable store.
//!
//! Works with AWS S3, MinIO and other S3-compatible services. Custom endpoints
//! use path-style addressing. Expiry is passed as the object's `Expires`
//! header; enforcing it is left to the bucket's lifecycle rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};
use shutter_core::{Artifact, CacheKey, DurableStore, StoreError};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint URL (MinIO, LocalStack, ...). Enables path-style access.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Durable store backed by an S3 bucket.
pub struct S3Store {
    bucket: Box<Bucket>,
    credentials: Credentials,
    region: Region,
    path_style: bool,
}

fn unavailable(operation: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable {
        reason: format!("S3 {} failed: {}", operation, e),
    }
}

/// Absence is decided by the response status alone. Error bodies echo the key,
/// so matching on their text would turn outages into misses.
fn is_not_found(e: &S3Error) -> bool {
    matches!(e, S3Error::HttpFailWithBody(404, _))
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, StoreError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| unavailable("region parse", e))?,
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| unavailable("credentials", e))?;

        let bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| unavailable("bucket setup", e))?;
        let path_style = config.endpoint.is_some();
        let bucket = if path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            credentials,
            region,
            path_style,
        })
    }

    /// Create the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<(), StoreError> {
        let exists = self
            .bucket
            .exists()
            .await
            .map_err(|e| unavailable("bucket lookup", e))?;
        if exists {
            return Ok(());
        }

        tracing::info!(bucket = %self.bucket.name(), "Creating bucket");
        let name = self.bucket.name();
        let config = BucketConfiguration::default();
        let created = if self.path_style {
            Bucket::create_with_path_style(
                &name,
                self.region.clone(),
                self.credentials.clone(),
                config,
            )
            .await
        } else {
            Bucket::create(&name, self.region.clone(), self.credentials.clone(), config).await
        };
        created.map_err(|e| unavailable("bucket create", e))?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for S3Store {
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        match self.bucket.head_object(key.as_str()).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(unavailable("head", e)),
        }
    }

    async fn get(&self, key: &CacheKey) -> Result<Artifact, StoreError> {
        let response = self
            .bucket
            .get_object(key.as_str())
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    unavailable("get", e)
                }
            })?;

        let content_type = response
            .headers()
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        Ok(Artifact::new(response.to_vec(), content_type))
    }

    async fn put(
        &self,
        key: &CacheKey,
        artifact: &Artifact,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = match expires_at {
            Some(at) => {
                let mut bucket = (*self.bucket).clone();
                bucket.add_header("Expires", &at.to_rfc2822());
                bucket
                    .put_object_with_content_type(key.as_str(), &artifact.body, &artifact.content_type)
                    .await
            }
            None => {
                self.bucket
                    .put_object_with_content_type(key.as_str(), &artifact.body, &artifact.content_type)
                    .await
            }
        };
        result.map_err(|e| unavailable("put", e))?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        match self.bucket.delete_object(key.as_str()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(unavailable("delete", e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
