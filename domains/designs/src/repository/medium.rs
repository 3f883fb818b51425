//! Persisted media holding the design document
//!
//! A medium stores one string per key, like browser local storage. The
//! store never assumes more than that.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use customizer_common::{Error, Result};

/// Key/value string storage
#[async_trait::async_trait]
pub trait PersistedMedium: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write the value; failures surface as `StorageWrite`.
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory medium with an optional byte quota
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the medium over `quota_bytes`
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Raw value under a key
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Overwrite a raw value, bypassing the quota
    pub fn put_raw(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.into());
        }
    }
}

#[async_trait::async_trait]
impl PersistedMedium for MemoryMedium {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| Error::Internal(format!("medium lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::StorageWrite(format!("medium lock poisoned: {e}")))?;

        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(Error::StorageWrite(format!(
                    "Quota exceeded writing {}: {} bytes needed, {} allowed",
                    key, needed, quota
                )));
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::Validation(format!("Invalid medium key: {}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait::async_trait]
impl PersistedMedium for FileMedium {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Internal(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let storage_err =
            |e: std::io::Error| Error::StorageWrite(format!("{}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(storage_err)?;

        // Write beside the target, then rename over it, so readers never see half a document
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&tmp, value).await.map_err(storage_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary design file");
            }
            return Err(storage_err(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_medium_round_trip() {
        let medium = MemoryMedium::new();
        assert!(medium.read("k").await.unwrap().is_none());

        medium.write("k", "v").await.unwrap();
        assert_eq!(medium.read("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_memory_medium_quota() {
        let medium = MemoryMedium::with_quota(10);
        medium.write("k", "12345").await.unwrap();

        // Replacing a key only counts the new value
        medium.write("k", "1234567").await.unwrap();

        let err = medium.write("k", "this is far too long").await.unwrap_err();
        assert!(matches!(err, Error::StorageWrite(_)));
        assert_eq!(medium.raw("k").as_deref(), Some("1234567"));
    }

    #[tokio::test]
    async fn test_file_medium_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("nested"));

        assert!(medium.read("customDesigns").await.unwrap().is_none());
        medium.write("customDesigns", "{\"designs\":{}}").await.unwrap();
        assert_eq!(
            medium.read("customDesigns").await.unwrap().as_deref(),
            Some("{\"designs\":{}}")
        );
        assert!(dir.path().join("nested/customDesigns.json").exists());
        assert!(!dir.path().join("nested/.customDesigns.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_medium_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the document should go cannot be replaced
        std::fs::create_dir_all(dir.path().join("customDesigns.json/inner")).unwrap();
        let medium = FileMedium::new(dir.path());

        let err = medium.write("customDesigns", "{}").await.unwrap_err();

        assert!(matches!(err, Error::StorageWrite(_)));
        assert!(!dir.path().join(".customDesigns.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_medium_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path());

        assert!(medium.write("../escape", "x").await.is_err());
        assert!(medium.read(".hidden").await.is_err());
    }
}
