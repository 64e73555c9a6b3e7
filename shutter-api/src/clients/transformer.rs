//! Upstream transformer client.
//!
//! The transformer is an imaginary-compatible service: the source image is
//! POSTed as a multipart field to `{upstream}/{action}` with the target size
//! in the query string. Several upstreams are used round-robin.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use shutter_core::{Artifact, SourceImage, TransformError, TransformParams, Transformer};

use super::truncate_body;
use crate::constants::TRANSFORM_FIELD;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Transformer reached over HTTP.
#[derive(Debug)]
pub struct HttpTransformer {
    client: Client,
    upstreams: Vec<String>,
    next: AtomicUsize,
}

impl HttpTransformer {
    pub fn new(client: Client, upstreams: Vec<String>) -> Self {
        let upstreams = upstreams
            .into_iter()
            .map(|u| u.trim_end_matches('/').to_string())
            .collect();
        Self {
            client,
            upstreams,
            next: AtomicUsize::new(0),
        }
    }

    pub fn upstreams(&self) -> &[String] {
        &self.upstreams
    }

    fn pick_upstream(&self) -> Option<&str> {
        if self.upstreams.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.upstreams.len();
        Some(&self.upstreams[i])
    }

    /// Query string for one transformation.
    fn query(params: &TransformParams) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("height", params.size.height.to_string()),
            ("width", params.size.width.to_string()),
            ("field", TRANSFORM_FIELD.to_string()),
        ];
        if let Some(output) = params.output_type {
            query.push(("type", output.to_string()));
        }
        query
    }

    fn file_part(source: &SourceImage, file_name: &str) -> Result<Part, TransformError> {
        let part = || Part::bytes(source.body.to_vec()).file_name(file_name.to_string());
        part()
            .mime_str(&source.content_type)
            .or_else(|_| part().mime_str(FALLBACK_CONTENT_TYPE))
            .map_err(|e| TransformError::Unavailable {
                reason: format!("building multipart body failed: {}", e),
            })
    }
}

#[async_trait]
impl Transformer for HttpTransformer {
    async fn transform(
        &self,
        source: SourceImage,
        params: &TransformParams,
    ) -> Result<Artifact, TransformError> {
        let upstream = self.pick_upstream().ok_or_else(|| TransformError::Unavailable {
            reason: "no transformer upstream configured".to_string(),
        })?;
        let url = format!("{}/{}", upstream, params.action);

        let form = Form::new().part(TRANSFORM_FIELD, Self::file_part(&source, &params.file_name)?);

        let response = self
            .client
            .post(&url)
            .query(&Self::query(params))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransformError::Unavailable {
                reason: format!("request to {} failed: {}", upstream, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = truncate_body(&body);
            tracing::warn!(
                upstream = %upstream,
                status = status.as_u16(),
                file = %params.file_name,
                "Transformer returned an error"
            );
            return Err(if status.is_client_error() {
                TransformError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            } else {
                TransformError::Unavailable {
                    reason: format!("{} returned {}: {}", upstream, status, message),
                }
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| params.output_type.map(|t| format!("image/{}", t)))
            .unwrap_or_else(|| source.content_type.clone());

        let body = response
            .bytes()
            .await
            .map_err(|e| TransformError::Unavailable {
                reason: format!("reading body from {} failed: {}", upstream, e),
            })?;

        Ok(Artifact::new(body, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_core::{Size, TransformAction};

    fn params(width: u64, height: u64, output_type: Option<&'static str>) -> TransformParams {
        let size = Size::new(width, height);
        TransformParams {
            action: size.action(),
            size,
            file_name: "a.jpg".to_string(),
            output_type,
        }
    }

    #[test]
    fn test_query_layout() {
        let query = HttpTransformer::query(&params(200, 0, Some("jpeg")));
        assert_eq!(
            query,
            vec![
                ("height", "0".to_string()),
                ("width", "200".to_string()),
                ("field", "file".to_string()),
                ("type", "jpeg".to_string()),
            ]
        );

        let query = HttpTransformer::query(&params(200, 400, None));
        assert_eq!(query.len(), 3);
        assert_eq!(params(200, 400, None).action, TransformAction::SmartCrop);
    }

    #[test]
    fn test_round_robin() {
        let transformer = HttpTransformer::new(
            Client::new(),
            vec!["http://a/".to_string(), "http://b".to_string()],
        );
        let picks: Vec<_> = (0..4)
            .map(|_| transformer.pick_upstream().unwrap().to_string())
            .collect();
        assert_eq!(picks, vec!["http://a", "http://b", "http://a", "http://b"]);
    }

    #[test]
    fn test_no_upstreams() {
        let transformer = HttpTransformer::new(Client::new(), Vec::new());
        assert!(transformer.pick_upstream().is_none());
    }
}
