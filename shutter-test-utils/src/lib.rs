//! shutter Test Utilities
//!
//! Shared test infrastructure for the shutter workspace:
//! - Fakes for the origin and the upstream transformer, with scripted
//!   outcomes and call counters
//! - Proptest generators for requests and sizes
//! - Fixtures and assertions for common scenarios

// Re-export the in-memory store from its source crate
pub use shutter_storage::{MemoryStore, StoreCallCounts};

// Re-export core types for convenience
pub use shutter_core::{
    derive_key, Artifact, CacheKey, OriginError, OriginFetcher, PipelineError, ResizeRequest,
    Size, SourceImage, TransformAction, TransformError, TransformParams, Transformer, Variant,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// FAKE ORIGIN
// ============================================================================

/// Origin serving a fixed set of images from memory.
///
/// Unknown paths answer `NotFound`. A scripted failure, once set, is returned
/// for every call until cleared.
#[derive(Debug, Default)]
pub struct FakeOrigin {
    images: Mutex<HashMap<(String, Variant), SourceImage>>,
    failure: Mutex<Option<OriginError>>,
    requests: Mutex<Vec<(String, Variant)>>,
    calls: AtomicU64,
    delay: Option<Duration>,
}

impl FakeOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `path` in both variants.
    pub fn with_image(self, path: &str, body: &'static [u8], content_type: &str) -> Self {
        for variant in [Variant::Standard, Variant::Hd] {
            self.insert(path, variant, SourceImage::new(body, content_type));
        }
        self
    }

    /// Delay every fetch, to exercise cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, path: &str, variant: Variant, image: SourceImage) {
        lock(&self.images).insert((path.to_string(), variant), image);
    }

    pub fn fail_with(&self, failure: Option<OriginError>) {
        *lock(&self.failure) = failure;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every (path, variant) fetched, in call order.
    pub fn requests(&self) -> Vec<(String, Variant)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl OriginFetcher for FakeOrigin {
    async fn fetch(&self, path: &str, variant: Variant) -> Result<SourceImage, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push((path.to_string(), variant));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = lock(&self.failure).clone() {
            return Err(failure);
        }

        lock(&self.images)
            .get(&(path.to_string(), variant))
            .cloned()
            .ok_or_else(|| OriginError::NotFound {
                path: path.to_string(),
            })
    }
}

// ============================================================================
// FAKE TRANSFORMER
// ============================================================================

/// Transformer that tags the source bytes instead of decoding them.
///
/// The output body is `"<action>:<w>x<h>:"` followed by the source body, so
/// tests can tell which transformation produced an artifact.
#[derive(Debug, Default)]
pub struct FakeTransformer {
    failure: Mutex<Option<TransformError>>,
    requests: Mutex<Vec<TransformParams>>,
    calls: AtomicU64,
    delay: Option<Duration>,
}

impl FakeTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_with(&self, failure: Option<TransformError>) {
        *lock(&self.failure) = failure;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransformParams> {
        lock(&self.requests).clone()
    }

    /// Body the fake produces for `source` under `params`.
    pub fn expected_body(source: &[u8], params: &TransformParams) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.put_slice(format!("{}:{}:", params.action, params.size).as_bytes());
        body.put_slice(source);
        body.to_vec()
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn transform(
        &self,
        source: SourceImage,
        params: &TransformParams,
    ) -> Result<Artifact, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(params.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = lock(&self.failure).clone() {
            return Err(failure);
        }

        let content_type = match params.output_type {
            Some(output) => format!("image/{}", output),
            None => source.content_type.clone(),
        };
        Ok(Artifact::new(
            Self::expected_body(&source.body, params),
            content_type,
        ))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for requests and sizes.

    use super::*;
    use proptest::prelude::*;
    use shutter_core::ALLOWED_DIMENSIONS;

    /// A dimension from the allowed set.
    pub fn arb_allowed_dimension() -> impl Strategy<Value = u64> {
        prop::sample::select(ALLOWED_DIMENSIONS.to_vec())
    }

    /// A size accepted by the proxy: one free dimension or two allowed ones.
    pub fn arb_allowed_size() -> impl Strategy<Value = Size> {
        prop_oneof![
            arb_allowed_dimension().prop_map(|w| Size::new(w, 0)),
            arb_allowed_dimension().prop_map(|h| Size::new(0, h)),
            (arb_allowed_dimension(), arb_allowed_dimension()).prop_map(|(w, h)| Size::new(w, h)),
        ]
    }

    pub fn arb_variant() -> impl Strategy<Value = Variant> {
        prop_oneof![Just(Variant::Standard), Just(Variant::Hd)]
    }

    /// A servable image path such as `pic/user/l/000/12/34.jpg`.
    pub fn arb_image_path() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["pic/cover/l", "pic/user/l", "pic/photo/l", "pic/crt/l"]),
            prop::collection::vec("[0-9a-f]{2}", 1..4),
            "[a-z0-9_]{1,12}",
            prop::sample::select(vec!["jpg", "png", "webp", "gif"]),
        )
            .prop_map(|(root, dirs, stem, ext)| format!("{}/{}/{}.{}", root, dirs.join("/"), stem, ext))
    }

    pub fn arb_resize_request() -> impl Strategy<Value = ResizeRequest> {
        (arb_image_path(), arb_allowed_size(), arb_variant())
            .prop_map(|(path, size, variant)| ResizeRequest::new(&path, size, variant))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    /// Smallest valid JPEG header, enough for content sniffing.
    pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    pub const COVER_PATH: &str = "pic/cover/l/c7/5e/12345_abcde.jpg";

    /// Origin serving [`JPEG_BYTES`] at [`COVER_PATH`].
    pub fn cover_origin() -> FakeOrigin {
        FakeOrigin::new().with_image(COVER_PATH, JPEG_BYTES, "image/jpeg")
    }

    /// Request for [`COVER_PATH`] at 200 pixels wide.
    pub fn cover_request() -> ResizeRequest {
        ResizeRequest::new(COVER_PATH, Size::new(200, 0), Variant::Standard)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for pipeline outcomes.

    use super::*;
    use shutter_core::FailureKind;

    /// Assert that a pipeline result failed with the given kind.
    #[track_caller]
    pub fn assert_failure<T: std::fmt::Debug>(
        result: &Result<T, PipelineError>,
        expected: FailureKind,
    ) {
        match result {
            Err(e) => assert_eq!(e.kind(), expected, "unexpected failure: {}", e),
            Ok(value) => panic!("Expected {:?} failure, got Ok({:?})", expected, value),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::*;

    #[tokio::test]
    async fn test_fake_origin_serves_and_counts() {
        let origin = cover_origin();
        let image = origin.fetch(COVER_PATH, Variant::Hd).await.unwrap();
        assert_eq!(image.body.as_ref(), JPEG_BYTES);

        let err = origin.fetch("pic/missing.jpg", Variant::Standard).await.unwrap_err();
        assert!(matches!(err, OriginError::NotFound { .. }));
        assert_eq!(origin.calls(), 2);
        assert_eq!(origin.requests()[0], (COVER_PATH.to_string(), Variant::Hd));
    }

    #[tokio::test]
    async fn test_fake_transformer_tags_output() {
        let transformer = FakeTransformer::new();
        let params = cover_request().transform_params();
        let artifact = transformer
            .transform(SourceImage::new(JPEG_BYTES, "image/jpeg"), &params)
            .await
            .unwrap();

        assert!(artifact.body.starts_with(b"resize:200x0:"));
        assert_eq!(artifact.content_type, "image/jpeg");
        assert_eq!(transformer.requests(), vec![params]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let transformer = FakeTransformer::new();
        transformer.fail_with(Some(TransformError::Rejected {
            status: 400,
            message: "bad image".to_string(),
        }));
        let params = cover_request().transform_params();
        let result = transformer
            .transform(SourceImage::new(JPEG_BYTES, "image/jpeg"), &params)
            .await;
        assert!(matches!(result, Err(TransformError::Rejected { status: 400, .. })));
    }
}
