//! Lookup seam for payloads held behind opaque storage references
//!
//! `localStorage://` and `indexedDB://` references carry only a key; the
//! bytes live in whatever local medium wrote them. Implementors hand back
//! the stored payload (usually a `data:` URL) or `None` when the key is
//! missing or expired.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::image_ref::StorageScheme;

/// Source of payloads for opaque references
#[async_trait::async_trait]
pub trait PayloadSource: Send + Sync {
    /// Load the payload stored under `key` for `scheme`
    async fn load(&self, scheme: StorageScheme, key: &str) -> Result<Option<String>>;
}

/// In-memory payload source, keyed by scheme and key
#[derive(Debug, Clone, Default)]
pub struct MemoryPayloadSource {
    entries: Arc<RwLock<HashMap<(StorageScheme, String), String>>>,
}

impl MemoryPayloadSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload under a key
    pub fn insert(&self, scheme: StorageScheme, key: impl Into<String>, payload: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((scheme, key.into()), payload.into());
        }
    }

    /// Drop a payload, simulating eviction
    pub fn evict(&self, scheme: StorageScheme, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(scheme, key.to_string()));
        }
    }
}

#[async_trait::async_trait]
impl PayloadSource for MemoryPayloadSource {
    async fn load(&self, scheme: StorageScheme, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Internal(format!("payload lock poisoned: {e}")))?;
        Ok(entries.get(&(scheme, key.to_string())).cloned())
    }
}

/// Payload source for runtimes with no local medium; every lookup misses
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPayloads;

#[async_trait::async_trait]
impl PayloadSource for NoPayloads {
    async fn load(&self, _scheme: StorageScheme, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
