//! Durable Image Store
//!
//! Provides upload of design images to a permanent, session-independent host:
//! - HTTP upload endpoint integration for production (`{success, url}` contract)
//! - Mock image store for testing and development
//! - Configurable provider, durable hosts, folder and upload attempt policy

pub mod client;
pub mod mock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdnError {
    #[error("CDN configuration error: {0}")]
    Configuration(String),

    #[error("CDN request error: {0}")]
    Request(String),

    #[error("CDN response error: {0}")]
    Response(String),
}

/// Upload of one image payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Data URL or remote http(s) URL the store should ingest
    pub file: String,
    /// Folder hint on the durable host
    pub folder: String,
    /// Filename hint (without extension)
    pub filename: String,
}

impl UploadRequest {
    /// Build a request whose filename is derived from the payload content
    pub fn for_payload(file: impl Into<String>, folder: impl Into<String>) -> Self {
        let file = file.into();
        let filename = filename_hint(&file);
        Self {
            file,
            folder: folder.into(),
            filename,
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub url: String,
}

/// Content-derived filename: `design_` + first 16 hex chars of sha256(payload)
pub fn filename_hint(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    format!("design_{}", &hex::encode(digest)[..16])
}

/// Durable image store configuration
#[derive(Clone)]
pub struct CdnConfig {
    /// Store provider (http, mock)
    pub provider: String,
    /// Upload endpoint for the http provider
    pub upload_url: Option<String>,
    /// Optional bearer token for the upload endpoint
    pub api_token: Option<String>,
    /// Hosts whose URLs are already permanent
    pub durable_hosts: Vec<String>,
    /// Folder hint for uploaded design images
    pub folder: String,
    /// Upload attempts per reference before degrading
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for CdnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnConfig")
            .field("provider", &self.provider)
            .field("upload_url", &self.upload_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("durable_hosts", &self.durable_hosts)
            .field("folder", &self.folder)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            upload_url: None,
            api_token: None,
            durable_hosts: vec!["res.cloudinary.com".to_string()],
            folder: "custom-designs".to_string(),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl CdnConfig {
    /// Create CDN config from environment variables
    pub fn from_env() -> Result<Self, CdnError> {
        let defaults = Self::default();

        let provider = std::env::var("CDN_PROVIDER").unwrap_or(defaults.provider);
        let upload_url = std::env::var("CDN_UPLOAD_URL").ok();
        let api_token = std::env::var("CDN_API_TOKEN").ok();

        let durable_hosts = match std::env::var("CDN_DURABLE_HOSTS") {
            Ok(raw) => raw
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            Err(_) => defaults.durable_hosts,
        };

        let folder = std::env::var("CDN_FOLDER").unwrap_or(defaults.folder);

        let max_attempts = match std::env::var("CDN_UPLOAD_MAX_ATTEMPTS") {
            Ok(raw) => raw.parse::<u32>().ok().filter(|n| *n >= 1).ok_or_else(|| {
                CdnError::Configuration(format!(
                    "CDN_UPLOAD_MAX_ATTEMPTS must be a positive integer, got {}",
                    raw
                ))
            })?,
            Err(_) => defaults.max_attempts,
        };

        let retry_backoff = match std::env::var("CDN_RETRY_BACKOFF_MS") {
            Ok(raw) => Duration::from_millis(raw.parse().map_err(|_| {
                CdnError::Configuration(format!(
                    "CDN_RETRY_BACKOFF_MS must be milliseconds, got {}",
                    raw
                ))
            })?),
            Err(_) => defaults.retry_backoff,
        };

        Ok(Self {
            provider,
            upload_url,
            api_token,
            durable_hosts,
            folder,
            max_attempts,
            retry_backoff,
        })
    }
}

/// Durable image store trait for different hosting backends
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// Upload one payload; the returned URL must be permanently reachable.
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, CdnError>;
}

/// Factory for creating ImageStore implementations
pub struct ImageStoreFactory;

impl ImageStoreFactory {
    pub fn create(config: &CdnConfig) -> Result<Box<dyn ImageStore>, CdnError> {
        match config.provider.as_str() {
            "http" => {
                let upload_url = config.upload_url.clone().ok_or_else(|| {
                    CdnError::Configuration(
                        "CDN_UPLOAD_URL is required for the http provider".to_string(),
                    )
                })?;
                tracing::info!(upload_url = %upload_url, "Creating HTTP image store");
                Ok(Box::new(client::HttpImageStore::new(
                    upload_url,
                    config.api_token.clone(),
                )))
            }
            "mock" => {
                tracing::info!("Creating mock image store");
                Ok(Box::new(mock::MockImageStore::new()))
            }
            provider => Err(CdnError::Configuration(format!(
                "Unknown CDN provider: {}. Supported providers: http, mock",
                provider
            ))),
        }
    }
}
