//! Transform Pipeline
//!
//! Cache-aside flow for one derived image: look the key up in the tiered
//! cache, and on a miss fetch the source from the origin, run it through the
//! transformer and store the result. Routes call [`TransformPipeline::resolve`]
//! and never talk to the collaborators directly.
//!
//! Every external call races the request's [`CancellationToken`]. There is no
//! request coalescing: concurrent misses for one key each run the full flow
//! and the last write wins.

use std::future::Future;
use std::sync::Arc;

use shutter_core::{Artifact, OriginFetcher, PipelineError, ResizeRequest, Transformer};
use shutter_storage::TieredCache;
use tokio_util::sync::CancellationToken;

/// Outcome of a successful resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub artifact: Artifact,
    /// Whether the artifact came from the cache.
    pub was_cached: bool,
}

/// Resolves resize requests against the cache and the upstream collaborators.
pub struct TransformPipeline {
    cache: Arc<TieredCache>,
    origin: Arc<dyn OriginFetcher>,
    transformer: Arc<dyn Transformer>,
}

impl TransformPipeline {
    pub fn new(
        cache: Arc<TieredCache>,
        origin: Arc<dyn OriginFetcher>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            cache,
            origin,
            transformer,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Produce the artifact for `request`, from the cache when possible.
    ///
    /// A failed cache write is logged and does not fail the request.
    pub async fn resolve(
        &self,
        request: &ResizeRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolved, PipelineError> {
        let key = request.key();

        if let Some(artifact) = cancellable(cancel, self.cache.get(&key)).await?? {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(Resolved {
                artifact,
                was_cached: true,
            });
        }

        let source = cancellable(cancel, self.origin.fetch(request.path(), request.variant()))
            .await??;

        let params = request.transform_params();
        let artifact = cancellable(cancel, self.transformer.transform(source, &params)).await??;

        match cancellable(cancel, self.cache.put(&key, &artifact)).await? {
            Ok(()) => tracing::debug!(key = %key, bytes = artifact.len(), "Stored artifact"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Cache write failed"),
        }

        Ok(Resolved {
            artifact,
            was_cached: false,
        })
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = fut => Ok(output),
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
