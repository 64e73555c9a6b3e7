//! Origin client: fetches source images over HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shutter_core::{OriginError, OriginFetcher, SourceImage, Variant};

use super::truncate_body;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Fetches `{base_url}/{path}`, adding `?hd=1` for the HD variant.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
    base_url: String,
}

impl HttpOrigin {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl OriginFetcher for HttpOrigin {
    async fn fetch(&self, path: &str, variant: Variant) -> Result<SourceImage, OriginError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.get(&url);
        if variant.is_hd() {
            request = request.query(&[("hd", "1")]);
        }

        let unavailable = |reason: String| OriginError::Unavailable {
            path: path.to_string(),
            reason,
        };

        let response = request
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(OriginError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(path = %path, status = status.as_u16(), "Origin returned an error");
            return Err(unavailable(format!(
                "origin returned {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(format!("reading body failed: {}", e)))?;

        tracing::debug!(path = %path, bytes = body.len(), "Fetched source image");
        Ok(SourceImage::new(body, content_type))
    }
}
