//! Resize Endpoint
//!
//! `GET /r/{size}/{path}` serves a derived image. `size` is `W` or `WxH`;
//! `?hd=1` selects the high-resolution source. Responses carry an immutable
//! `Cache-Control` and `X-Cache: HIT|MISS`.

use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use shutter_core::{
    check_path, check_size, normalize_path, parse_size, PipelineError, ResizeRequest, Variant,
};
use tokio_util::sync::CancellationToken;

use crate::constants::{IMMUTABLE_CACHE_CONTROL, USAGE, X_CACHE_HEADER};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::Resolved;
use crate::state::AppState;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Query parameters of the resize endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResizeQuery {
    pub hd: Option<String>,
}

impl ResizeQuery {
    /// `hd=1` or `hd=true` selects the HD variant; anything else does not.
    pub fn variant(&self) -> Variant {
        let hd = self
            .hd
            .as_deref()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Variant::from_flag(hd)
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET / and GET /r/ - Usage note
pub async fn usage() -> &'static str {
    USAGE
}

/// GET /r/{size}/{*path} - Serve a derived image
pub async fn resize(
    State(state): State<AppState>,
    Path((size, path)): Path<(String, String)>,
    Query(query): Query<ResizeQuery>,
) -> ApiResult<Response> {
    check_path(&normalize_path(&path))?;
    let size = parse_size(&size)?;
    check_size(size)?;
    let request = ResizeRequest::new(&path, size, query.variant());

    let started = Instant::now();
    let cancel = CancellationToken::new();
    // Cancels in-flight work when the client goes away and this future is dropped.
    let _guard = cancel.clone().drop_guard();

    let result = match tokio::time::timeout(
        state.request_timeout,
        state.pipeline.resolve(&request, &cancel),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            tracing::warn!(
                path = %request.path(),
                timeout_ms = state.request_timeout.as_millis() as u64,
                "Resize request timed out"
            );
            Err(PipelineError::Cancelled)
        }
    };

    match result {
        Ok(resolved) => {
            state
                .metrics
                .record_resolved(resolved.was_cached, started.elapsed().as_secs_f64());
            Ok(image_response(resolved))
        }
        Err(e) => {
            state.metrics.record_failure(e.kind());
            tracing::debug!(
                path = %request.path(),
                size = %request.size(),
                kind = e.kind().as_str(),
                error = %e,
                "Resize request failed"
            );
            Err(ApiError::from(e))
        }
    }
}

fn image_response(resolved: Resolved) -> Response {
    let Resolved {
        artifact,
        was_cached,
    } = resolved;

    let content_type = HeaderValue::from_str(&artifact.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    let x_cache = if was_cached { "HIT" } else { "MISS" };

    let mut response = (StatusCode::OK, artifact.body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE_CONTROL));
    headers.insert(
        HeaderName::from_static(X_CACHE_HEADER),
        HeaderValue::from_static(x_cache),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_core::Artifact;

    #[test]
    fn test_hd_flag() {
        let query = |hd: Option<&str>| ResizeQuery {
            hd: hd.map(str::to_string),
        };
        assert_eq!(query(None).variant(), Variant::Standard);
        assert_eq!(query(Some("1")).variant(), Variant::Hd);
        assert_eq!(query(Some("TRUE")).variant(), Variant::Hd);
        assert_eq!(query(Some("0")).variant(), Variant::Standard);
    }

    #[test]
    fn test_image_response_headers() {
        let response = image_response(Resolved {
            artifact: Artifact::new(vec![1u8, 2, 3], "image/webp"),
            was_cached: true,
        });

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "image/webp");
        assert_eq!(headers[CACHE_CONTROL], IMMUTABLE_CACHE_CONTROL);
        assert_eq!(headers[X_CACHE_HEADER], "HIT");
    }

    #[test]
    fn test_invalid_content_type_falls_back() {
        let response = image_response(Resolved {
            artifact: Artifact::new(vec![1u8], "bad\nvalue"),
            was_cached: false,
        });
        assert_eq!(response.headers()[CONTENT_TYPE], FALLBACK_CONTENT_TYPE);
        assert_eq!(response.headers()[X_CACHE_HEADER], "MISS");
    }
}
