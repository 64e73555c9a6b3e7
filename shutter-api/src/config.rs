//! Proxy Configuration Module
//!
//! Configuration is read from environment variables once at start-up and is
//! immutable afterwards. Every setting except the transformer upstreams has a
//! development default.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use shutter_core::ConfigError;
use shutter_storage::CostMode;

use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_CACHE_CAPACITY, DEFAULT_EVICTION_QUEUE, DEFAULT_FS_ROOT,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_ORIGIN_URL, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_S3_BUCKET, DEFAULT_S3_REGION,
};

// ============================================================================
// BACKEND AND FORMAT SELECTION
// ============================================================================

/// S3 connection settings as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Durable store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Fs { root: String },
    S3(S3Settings),
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Fs { .. } => "fs",
            StoreBackend::S3(_) => "s3",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected json or pretty, got '{}'", other)),
        }
    }
}

// ============================================================================
// PROXY CONFIGURATION
// ============================================================================

/// Runtime configuration for the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    // ========================================================================
    // Server
    // ========================================================================
    pub bind_host: String,
    pub port: u16,
    /// Deadline for one resize request; expiry cancels the pipeline.
    pub request_timeout: Duration,

    // ========================================================================
    // Upstreams
    // ========================================================================
    pub origin_url: String,
    /// Transformer base URLs, used round-robin.
    pub upstreams: Vec<String>,
    /// Timeout applied by the shared HTTP client.
    pub http_timeout: Duration,

    // ========================================================================
    // Cache
    // ========================================================================
    /// Membership index capacity. Zero disables the index.
    pub cache_capacity: u64,
    pub cost_mode: CostMode,
    pub eviction_queue: usize,
    /// Durable object expiry. `None` keeps objects until evicted.
    pub store_ttl: Option<Duration>,
    pub store: StoreBackend,

    // ========================================================================
    // Logging
    // ========================================================================
    pub log_format: LogFormat,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            origin_url: DEFAULT_ORIGIN_URL.to_string(),
            upstreams: Vec::new(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cost_mode: CostMode::Entries,
            eviction_queue: DEFAULT_EVICTION_QUEUE,
            store_ttl: None,
            store: StoreBackend::Memory,
            log_format: LogFormat::Json,
        }
    }
}

fn invalid(field: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Parse an optional variable, rejecting values that do not parse.
fn parse_var<T, F>(lookup: &F, field: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(field) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(field, &raw, e.to_string())),
        None => Ok(default),
    }
}

fn non_empty<F>(lookup: &F, field: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(field)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl ProxyConfig {
    /// Create ProxyConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SHUTTER_BIND`: Listen host (default: 127.0.0.1)
    /// - `PORT` or `SHUTTER_PORT`: Listen port (default: 8003)
    /// - `SHUTTER_ORIGIN_URL`: Origin base URL (default: http://lain.bgm.tv)
    /// - `SHUTTER_UPSTREAMS`: Comma-separated transformer base URLs (required)
    /// - `SHUTTER_CACHE_CAPACITY`: Index capacity, 0 disables the index (default: 100000)
    /// - `SHUTTER_CACHE_COST`: "entries" or "bytes" (default: entries)
    /// - `SHUTTER_EVICTION_QUEUE`: Eviction queue bound (default: 1024)
    /// - `SHUTTER_STORE_TTL_SECS`: Durable expiry, 0 = none (default: 0)
    /// - `SHUTTER_STORE`: "memory", "fs" or "s3" (default: memory)
    /// - `SHUTTER_FS_ROOT`: Directory for the fs backend (default: ./data)
    /// - `SHUTTER_S3_*`: Endpoint, bucket, region and credentials for the s3 backend
    /// - `SHUTTER_REQUEST_TIMEOUT_SECS`: Per-request deadline (default: 30)
    /// - `SHUTTER_HTTP_TIMEOUT_SECS`: Upstream HTTP client timeout (default: 20)
    /// - `SHUTTER_LOG_FORMAT`: "json" or "pretty" (default: json)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source and validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(_) => parse_var(&lookup, "PORT", DEFAULT_PORT)?,
            None => parse_var(&lookup, "SHUTTER_PORT", DEFAULT_PORT)?,
        };

        let upstreams = lookup("SHUTTER_UPSTREAMS")
            .map(|s| {
                s.split(',')
                    .map(|u| u.trim().trim_end_matches('/').to_string())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cost_mode = match lookup("SHUTTER_CACHE_COST") {
            Some(raw) => raw
                .parse()
                .map_err(|reason: String| invalid("SHUTTER_CACHE_COST", &raw, reason))?,
            None => defaults.cost_mode,
        };

        let ttl_secs: u64 = parse_var(&lookup, "SHUTTER_STORE_TTL_SECS", 0)?;

        let store = match non_empty(&lookup, "SHUTTER_STORE")
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("memory") => StoreBackend::Memory,
            Some("fs") => StoreBackend::Fs {
                root: non_empty(&lookup, "SHUTTER_FS_ROOT")
                    .unwrap_or_else(|| DEFAULT_FS_ROOT.to_string()),
            },
            Some("s3") => StoreBackend::S3(S3Settings {
                endpoint: non_empty(&lookup, "SHUTTER_S3_ENDPOINT"),
                bucket: non_empty(&lookup, "SHUTTER_S3_BUCKET")
                    .unwrap_or_else(|| DEFAULT_S3_BUCKET.to_string()),
                region: non_empty(&lookup, "SHUTTER_S3_REGION")
                    .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
                access_key: non_empty(&lookup, "SHUTTER_S3_ACCESS_KEY"),
                secret_key: non_empty(&lookup, "SHUTTER_S3_SECRET_KEY"),
            }),
            Some(other) => {
                return Err(invalid("SHUTTER_STORE", other, "expected memory, fs or s3"));
            }
        };

        let log_format = parse_var(&lookup, "SHUTTER_LOG_FORMAT", defaults.log_format)?;

        let config = Self {
            bind_host: non_empty(&lookup, "SHUTTER_BIND").unwrap_or(defaults.bind_host),
            port,
            request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "SHUTTER_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            origin_url: non_empty(&lookup, "SHUTTER_ORIGIN_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.origin_url),
            upstreams,
            http_timeout: Duration::from_secs(parse_var(
                &lookup,
                "SHUTTER_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            cache_capacity: parse_var(&lookup, "SHUTTER_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
            cost_mode,
            eviction_queue: parse_var(&lookup, "SHUTTER_EVICTION_QUEUE", DEFAULT_EVICTION_QUEUE)?,
            store_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            store,
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstreams.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "SHUTTER_UPSTREAMS".to_string(),
            });
        }

        for upstream in &self.upstreams {
            check_url("SHUTTER_UPSTREAMS", upstream)?;
        }
        check_url("SHUTTER_ORIGIN_URL", &self.origin_url)?;

        if let StoreBackend::S3(s3) = &self.store {
            if let Some(endpoint) = &s3.endpoint {
                check_url("SHUTTER_S3_ENDPOINT", endpoint)?;
            }
        }

        if self.eviction_queue == 0 {
            return Err(invalid(
                "SHUTTER_EVICTION_QUEUE",
                "0",
                "queue bound must be positive",
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(invalid(
                "SHUTTER_REQUEST_TIMEOUT_SECS",
                "0",
                "timeout must be positive",
            ));
        }

        Ok(())
    }

    /// Resolve the listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_host, self.port);
        raw.parse()
            .map_err(|e: std::net::AddrParseError| invalid("SHUTTER_BIND", &raw, e.to_string()))
    }
}

fn check_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(field, raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field,
            raw,
            format!("unsupported scheme '{}'", scheme),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_with_upstreams() {
        let config =
            ProxyConfig::from_lookup(lookup_from(&[("SHUTTER_UPSTREAMS", "http://127.0.0.1:9000/")]))
                .unwrap();

        assert_eq!(config.upstreams, vec!["http://127.0.0.1:9000".to_string()]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.origin_url, DEFAULT_ORIGIN_URL);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.cost_mode, CostMode::Entries);
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.store_ttl, None);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.bind_addr().unwrap(),
            "127.0.0.1:8003".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_missing_upstreams_rejected() {
        let err = ProxyConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "SHUTTER_UPSTREAMS".to_string()
            }
        );
    }

    #[test]
    fn test_full_configuration() {
        let config = ProxyConfig::from_lookup(lookup_from(&[
            ("SHUTTER_UPSTREAMS", "http://a:9000, http://b:9000,"),
            ("SHUTTER_BIND", "0.0.0.0"),
            ("PORT", "9100"),
            ("SHUTTER_PORT", "9200"),
            ("SHUTTER_CACHE_CAPACITY", "0"),
            ("SHUTTER_CACHE_COST", "Bytes"),
            ("SHUTTER_STORE_TTL_SECS", "3600"),
            ("SHUTTER_STORE", "fs"),
            ("SHUTTER_FS_ROOT", "/var/cache/shutter"),
            ("SHUTTER_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.port, 9100);
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.cache_capacity, 0);
        assert_eq!(config.cost_mode, CostMode::Bytes);
        assert_eq!(config.store_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(
            config.store,
            StoreBackend::Fs {
                root: "/var/cache/shutter".to_string()
            }
        );
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_s3_settings() {
        let config = ProxyConfig::from_lookup(lookup_from(&[
            ("SHUTTER_UPSTREAMS", "http://a:9000"),
            ("SHUTTER_STORE", "s3"),
            ("SHUTTER_S3_ENDPOINT", "http://minio:9000"),
            ("SHUTTER_S3_ACCESS_KEY", "key"),
        ]))
        .unwrap();

        match config.store {
            StoreBackend::S3(s3) => {
                assert_eq!(s3.bucket, DEFAULT_S3_BUCKET);
                assert_eq!(s3.region, DEFAULT_S3_REGION);
                assert_eq!(s3.endpoint.as_deref(), Some("http://minio:9000"));
                assert_eq!(s3.access_key.as_deref(), Some("key"));
                assert_eq!(s3.secret_key, None);
            }
            other => panic!("expected s3 backend, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("SHUTTER_CACHE_COST", "pages"),
            ("SHUTTER_STORE", "redis"),
            ("SHUTTER_LOG_FORMAT", "xml"),
            ("SHUTTER_CACHE_CAPACITY", "-1"),
            ("SHUTTER_ORIGIN_URL", "not a url"),
            ("SHUTTER_EVICTION_QUEUE", "0"),
        ];

        for (field, value) in cases {
            let err = ProxyConfig::from_lookup(lookup_from(&[
                ("SHUTTER_UPSTREAMS", "http://a:9000"),
                (field, value),
            ]))
            .unwrap_err();
            match err {
                ConfigError::InvalidValue { field: f, .. } => assert_eq!(f, field),
                other => panic!("{}={} gave {:?}", field, value, other),
            }
        }
    }

    #[test]
    fn test_upstream_scheme_checked() {
        let err = ProxyConfig::from_lookup(lookup_from(&[("SHUTTER_UPSTREAMS", "ftp://a:21")]))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }
}
