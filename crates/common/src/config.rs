//! Configuration management following 12-factor app principles
//!
//! Runtime settings shared by the pipeline are loaded from environment
//! variables. Provider-specific settings (CDN, cart) live next to their
//! clients in their own crates.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default key of the persisted design document
pub const DEFAULT_STORE_KEY: &str = "customDesigns";

/// Default auto-save period in seconds
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the persisted design document
    pub design_store_dir: PathBuf,

    /// Key (file stem) of the persisted design document
    pub design_store_key: String,

    /// Auto-save polling period
    pub autosave_interval_secs: u64,

    /// Fallback tracing filter when RUST_LOG is unset
    pub rust_log: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let autosave_interval_secs = match env::var("AUTOSAVE_INTERVAL_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    anyhow::anyhow!("AUTOSAVE_INTERVAL_SECS must be a whole number of seconds")
                })?;
                if secs == 0 {
                    anyhow::bail!("AUTOSAVE_INTERVAL_SECS must be greater than zero");
                }
                secs
            }
            Err(_) => DEFAULT_AUTOSAVE_INTERVAL_SECS,
        };

        let config = Self {
            design_store_dir: env::var("DESIGN_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".designs")),
            design_store_key: env::var("DESIGN_STORE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORE_KEY.to_string()),
            autosave_interval_secs,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "customizer=info".to_string()),
        };

        Ok(config)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}
