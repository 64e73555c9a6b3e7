//! Traits for the external collaborators of the cache-aside flow.
//!
//! The pipeline and the tiered cache only ever see these traits, so tests can
//! swap in fakes and deployments can pick a store backend at start-up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{OriginError, StoreError, TransformError};
use crate::key::CacheKey;
use crate::types::{Artifact, SourceImage, TransformParams, Variant};

/// Durable blob store holding derived artifacts.
///
/// The store is authoritative for artifact bytes. Implementations must be safe
/// to share across tasks; every method may be called concurrently.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Whether an object exists under `key`.
    async fn exists(&self, key: &CacheKey) -> Result<bool, StoreError>;

    /// Read an object. Absent objects yield [`StoreError::NotFound`].
    async fn get(&self, key: &CacheKey) -> Result<Artifact, StoreError>;

    /// Write an object, replacing any previous one.
    ///
    /// `expires_at` is a hint for backends with native expiry; `None` means
    /// the object never expires on its own.
    async fn put(
        &self,
        key: &CacheKey,
        artifact: &Artifact,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Delete an object. Deleting an absent object is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Source of original images.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, path: &str, variant: Variant) -> Result<SourceImage, OriginError>;
}

/// Upstream image transformation service.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        source: SourceImage,
        params: &TransformParams,
    ) -> Result<Artifact, TransformError>;
}
