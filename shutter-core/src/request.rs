//! Resize request model and path policy.

use crate::error::ValidationError;
use crate::key::{derive_key, normalize_path, CacheKey};
use crate::size::Size;
use crate::types::{TransformParams, Variant};

const COVER_PREFIX: &str = "pic/cover/";
const COVER_LARGE_PREFIX: &str = "pic/cover/l/";
const COVER_HINT: &str = "/r/<size>/pic/cover/l/";

/// Reject paths the proxy refuses to serve.
///
/// Covers are only resized from the large (`l`) directory; the smaller
/// pre-rendered cover directories are blocked. Expects a normalized path.
pub fn check_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::EmptyPath);
    }
    if path.starts_with(COVER_PREFIX) && !path.starts_with(COVER_LARGE_PREFIX) {
        return Err(ValidationError::BlockedPath {
            path: path.to_string(),
            hint: COVER_HINT.to_string(),
        });
    }
    Ok(())
}

/// A request for one derived artifact.
///
/// Construction only normalizes the path. Serving policy (blocked paths,
/// allowed sizes) belongs to the HTTP layer; see [`check_path`] and
/// [`crate::size::check_size`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    path: String,
    size: Size,
    variant: Variant,
}

impl ResizeRequest {
    pub fn new(path: &str, size: Size, variant: Variant) -> Self {
        Self {
            path: normalize_path(path),
            size,
            variant,
        }
    }

    /// Normalized origin path, without a leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn key(&self) -> CacheKey {
        derive_key(&self.path, self.size, self.variant)
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Output format forced on the transformer, based on the file extension.
    pub fn output_type(&self) -> Option<&'static str> {
        let ext = self.file_name().rsplit_once('.').map(|(_, ext)| ext)?;
        if ext.eq_ignore_ascii_case("jpg") {
            Some("jpeg")
        } else if ext.eq_ignore_ascii_case("webp") {
            Some("webp")
        } else {
            None
        }
    }

    pub fn transform_params(&self) -> TransformParams {
        TransformParams {
            action: self.size.action(),
            size: self.size,
            file_name: self.file_name().to_string(),
            output_type: self.output_type(),
        }
    }
}
