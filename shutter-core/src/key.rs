//! Cache key derivation.
//!
//! A [`CacheKey`] names one derived artifact. Keys double as durable store
//! paths, so they always begin with `/` and stay readable when debugging:
//!
//! ```text
//! pic/cover/l/a.jpg at 200x0          -> /pic/cover/l/a.jpg@200x0
//! pic/cover/l/a.jpg at 200x0, hd      -> /pic/cover/l/a.jpg@200x0@hd
//! ```
//!
//! Every key ends with either `@<w>x<h>` or `@<w>x<h>@hd`, so two different
//! (path, size, variant) tuples can never produce the same key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::size::Size;
use crate::types::Variant;

/// Canonical key of a derived artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an existing store path as a key.
    ///
    /// Used for keys that did not come from [`derive_key`] (store listings,
    /// probes, tests). A leading `/` is added when missing.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with('/') {
            Self(raw)
        } else {
            Self(format!("/{}", raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a logical image path.
///
/// Drops empty and `.` segments and resolves `..` without ever climbing above
/// the root. The result has no leading or trailing `/`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Derive the cache key for a (path, size, variant) request.
///
/// Total and deterministic: the same logical request always yields the same key.
pub fn derive_key(path: &str, size: Size, variant: Variant) -> CacheKey {
    let normalized = normalize_path(path);
    let (dir, base) = match normalized.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, normalized.as_str()),
    };

    let mut key = String::with_capacity(normalized.len() + 24);
    key.push('/');
    if let Some(dir) = dir {
        key.push_str(dir);
        key.push('/');
    }
    key.push_str(base);
    key.push_str(&format!("@{}x{}", size.width, size.height));
    if variant == Variant::Hd {
        key.push_str("@hd");
    }

    CacheKey(key)
}
