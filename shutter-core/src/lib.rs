//! shutter Core - Data types for the shutter image proxy
//!
//! This crate holds everything the other crates agree on:
//! - Cache key derivation ([`derive_key`]) and the [`CacheKey`] newtype
//! - Size parsing and validation ([`parse_size`], [`Size`])
//! - Request, source and artifact types
//! - Traits for the three external collaborators: [`DurableStore`],
//!   [`OriginFetcher`] and [`Transformer`]
//! - The error taxonomy shared by the cache, pipeline and HTTP layers

pub mod error;
pub mod key;
pub mod request;
pub mod size;
pub mod traits;
pub mod types;

pub use error::{
    CacheError, ConfigError, FailureKind, OriginError, PipelineError, ShutterError,
    ShutterResult, StoreError, TransformError, ValidationError,
};
pub use key::{derive_key, normalize_path, CacheKey};
pub use request::{check_path, ResizeRequest};
pub use size::{
    check_size, is_allowed_dimension, parse_size, Size, TransformAction, ALLOWED_DIMENSIONS,
};
pub use traits::{DurableStore, OriginFetcher, Transformer};
pub use types::{Artifact, SourceImage, TransformParams, Variant};
