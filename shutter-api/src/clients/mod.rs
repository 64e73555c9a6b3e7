//! HTTP clients for the origin and the upstream transformer.
//!
//! Both share one pooled `reqwest::Client` built at start-up.

mod origin;
mod transformer;

pub use origin::HttpOrigin;
pub use transformer::HttpTransformer;

use std::time::Duration;

/// Build the shared HTTP client with the configured timeout.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("shutter/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Shorten an upstream error body for logs and error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 256;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
