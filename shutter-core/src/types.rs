//! Payload and parameter types passed between the pipeline and its collaborators.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::size::{Size, TransformAction};

/// Which version of the source asset to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Standard,
    /// Higher resolution original, selected with `?hd=1`.
    Hd,
}

impl Variant {
    pub fn from_flag(hd: bool) -> Self {
        if hd {
            Variant::Hd
        } else {
            Variant::Standard
        }
    }

    pub fn is_hd(&self) -> bool {
        matches!(self, Variant::Hd)
    }
}

/// A derived image as stored in the durable tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub body: Bytes,
    pub content_type: String,
}

impl Artifact {
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Unmodified bytes fetched from the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub body: Bytes,
    pub content_type: String,
}

impl SourceImage {
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }
}

/// Everything the transformer needs besides the source bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformParams {
    pub action: TransformAction,
    pub size: Size,
    /// File name sent with the multipart field.
    pub file_name: String,
    /// Output format hint (`jpeg`, `webp`), when the extension implies one.
    pub output_type: Option<&'static str>,
}
