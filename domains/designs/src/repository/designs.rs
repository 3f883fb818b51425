//! Design repository over a persisted medium
//!
//! All designs live in one JSON document under a single key:
//! `{ "designs": { id: StoredDesign, … }, "currentDesign": id }`.
//! The store is capacity-bounded (oldest by `lastModified` evicted first)
//! and age-bounded (expired designs are purged whenever the document is read).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use customizer_common::config::DEFAULT_STORE_KEY;
use customizer_common::{Clock, Error, PayloadSource, Result, StorageScheme, SystemClock};

use super::medium::PersistedMedium;
use crate::domain::entities::{DesignDraft, DesignPatch, DesignSummary, StoredDesign};

/// Most designs kept at once
pub const MAX_DESIGNS: usize = 10;

/// Designs untouched for longer than this are purged
pub const MAX_AGE_DAYS: i64 = 30;

/// The persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignDocument {
    /// Designs in insertion order
    #[serde(default, with = "ordered_designs")]
    pub designs: Vec<StoredDesign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_design: Option<String>,
}

impl DesignDocument {
    fn position(&self, id: &str) -> Option<usize> {
        self.designs.iter().position(|d| d.id == id)
    }

    fn current_is_valid(&self) -> bool {
        self.current_design
            .as_deref()
            .map_or(true, |id| self.position(id).is_some())
    }

    /// Drop the current pointer if it no longer names a design
    fn repair_current(&mut self) {
        if !self.current_is_valid() {
            self.current_design = None;
        }
    }
}

/// Serializes `Vec<StoredDesign>` as a JSON object keyed by design id,
/// keeping insertion order in both directions.
///
/// A design read from JSON keeps its source bytes and is written back
/// verbatim while it still equals what those bytes parse to.
mod ordered_designs {
    use std::fmt;

    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use serde_json::value::RawValue;

    use crate::domain::entities::{SourceJson, StoredDesign};

    /// Source bytes of `design`, if it has not changed since it was read
    fn unchanged_source(design: &StoredDesign) -> Option<&RawValue> {
        let raw = design.source.0.as_deref()?;
        let mut parsed: StoredDesign = serde_json::from_str(raw.get()).ok()?;
        parsed.id = design.id.clone();
        (parsed == *design).then_some(raw)
    }

    pub fn serialize<S: Serializer>(
        designs: &[StoredDesign],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(designs.len()))?;
        for design in designs {
            match unchanged_source(design) {
                Some(raw) => map.serialize_entry(&design.id, raw)?,
                None => map.serialize_entry(&design.id, design)?,
            }
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<StoredDesign>, D::Error> {
        struct DesignsVisitor;

        impl<'de> Visitor<'de> for DesignsVisitor {
            type Value = Vec<StoredDesign>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of design id to design")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut designs: Vec<StoredDesign> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, raw)) = map.next_entry::<String, Box<RawValue>>()? {
                    let mut design: StoredDesign =
                        serde_json::from_str(raw.get()).map_err(de::Error::custom)?;
                    // The map key is authoritative
                    design.id = id;
                    design.source = SourceJson(Some(raw));
                    match designs.iter_mut().find(|d| d.id == design.id) {
                        Some(existing) => *existing = design,
                        None => designs.push(design),
                    }
                }
                Ok(designs)
            }
        }

        deserializer.deserialize_map(DesignsVisitor)
    }
}

/// Keyed, capacity- and age-bounded design storage
pub struct DesignStore {
    medium: Arc<dyn PersistedMedium>,
    key: String,
    clock: Arc<dyn Clock>,
    max_designs: usize,
    max_age: Duration,
    last_issued: Mutex<Option<DateTime<Utc>>>,
    // Serializes read-modify-write cycles on this instance
    gate: tokio::sync::Mutex<()>,
}

impl DesignStore {
    pub fn new(medium: Arc<dyn PersistedMedium>) -> Self {
        Self {
            medium,
            key: DEFAULT_STORE_KEY.to_string(),
            clock: Arc::new(SystemClock),
            max_designs: MAX_DESIGNS,
            max_age: Duration::days(MAX_AGE_DAYS),
            last_issued: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Store the document under another key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_limits(mut self, max_designs: usize, max_age: Duration) -> Self {
        self.max_designs = max_designs.max(1);
        self.max_age = max_age;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next `lastModified`, in whole milliseconds and strictly increasing per instance
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let now = now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos() % 1_000_000));
        let mut last = self
            .last_issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let issued = match *last {
            Some(previous) if now <= previous => previous + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(issued);
        issued
    }

    async fn read_document(&self) -> Result<DesignDocument> {
        let Some(raw) = self.medium.read(&self.key).await? else {
            return Ok(DesignDocument::default());
        };
        match serde_json::from_str::<DesignDocument>(&raw) {
            Ok(mut document) => {
                document.repair_current();
                Ok(document)
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding unreadable design document");
                Ok(DesignDocument::default())
            }
        }
    }

    async fn write_document(&self, document: &DesignDocument) -> Result<()> {
        let raw = serde_json::to_string(document)?;
        self.medium.write(&self.key, &raw).await
    }

    /// Read the document with expired designs removed.
    ///
    /// The purge is written back straight away; if that write fails the
    /// caller still gets the filtered view.
    async fn load_live(&self) -> Result<DesignDocument> {
        let mut document = self.read_document().await?;
        let cutoff = self.clock.now() - self.max_age;
        let before = document.designs.len();
        document.designs.retain(|d| d.last_modified >= cutoff);

        let purged = before - document.designs.len();
        if purged > 0 {
            document.repair_current();
            tracing::info!(purged, "Purged expired designs");
            if let Err(e) = self.write_document(&document).await {
                tracing::warn!(error = %e, "Failed to persist purge of expired designs");
            }
        }
        Ok(document)
    }

    /// Drop the oldest designs beyond the cap; ties go to the earlier insert.
    fn enforce_capacity(&self, document: &mut DesignDocument) {
        while document.designs.len() > self.max_designs {
            let Some(oldest) = document
                .designs
                .iter()
                .enumerate()
                .min_by_key(|(i, d)| (d.last_modified, *i))
                .map(|(i, _)| i)
            else {
                break;
            };
            let evicted = document.designs.remove(oldest);
            tracing::info!(design_id = %evicted.id, "Evicted design over capacity");
        }
        document.repair_current();
    }

    /// All live designs, in insertion order
    pub async fn list(&self) -> Result<Vec<StoredDesign>> {
        let _guard = self.gate.lock().await;
        Ok(self.load_live().await?.designs)
    }

    /// Listing entries, newest first
    pub async fn summaries(&self) -> Result<Vec<DesignSummary>> {
        let mut designs = self.list().await?;
        designs.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(designs.iter().map(StoredDesign::summary).collect())
    }

    /// Insert a new design and make it current
    pub async fn save(&self, draft: DesignDraft) -> Result<StoredDesign> {
        let _guard = self.gate.lock().await;
        let mut document = self.load_live().await?;

        let id = format!("design_{}", Uuid::new_v4().simple());
        let design = draft.into_stored(id.clone(), self.next_timestamp());
        document.designs.push(design.clone());
        document.current_design = Some(id.clone());
        self.enforce_capacity(&mut document);

        self.write_document(&document).await?;
        tracing::debug!(design_id = %id, product_id = %design.product_id, "Design saved");
        Ok(design)
    }

    /// Merge changes into an existing design and bump its `lastModified`
    pub async fn update(&self, id: &str, patch: DesignPatch) -> Result<StoredDesign> {
        let _guard = self.gate.lock().await;
        let mut document = self.load_live().await?;

        let index = document
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("Design {} not found", id)))?;
        let design = &mut document.designs[index];
        patch.apply(design);
        design.last_modified = self.next_timestamp();
        let updated = design.clone();

        self.write_document(&document).await?;
        tracing::debug!(design_id = %id, "Design updated");
        Ok(updated)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<StoredDesign>> {
        let _guard = self.gate.lock().await;
        let document = self.load_live().await?;
        Ok(document.designs.into_iter().find(|d| d.id == id))
    }

    /// Designs for a product, newest first
    pub async fn get_for_product(&self, product_id: &str) -> Result<Vec<StoredDesign>> {
        let mut designs: Vec<StoredDesign> = self
            .list()
            .await?
            .into_iter()
            .filter(|d| d.product_id == product_id)
            .collect();
        designs.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(designs)
    }

    /// Most recent design for a product and customizable slot
    pub async fn get_for_product_and_slot(
        &self,
        product_id: &str,
        selected_custom_image: Option<&str>,
    ) -> Result<Option<StoredDesign>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|d| d.matches(product_id, selected_custom_image))
            .max_by_key(|d| d.last_modified))
    }

    /// Remove one design; returns whether it existed
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.gate.lock().await;
        let mut document = self.load_live().await?;

        let Some(index) = document.position(id) else {
            return Ok(false);
        };
        document.designs.remove(index);
        document.repair_current();
        self.write_document(&document).await?;
        tracing::debug!(design_id = %id, "Design removed");
        Ok(true)
    }

    /// Remove every design for a product; returns how many were removed
    pub async fn reset_for_product(&self, product_id: &str) -> Result<usize> {
        let _guard = self.gate.lock().await;
        let mut document = self.load_live().await?;

        let before = document.designs.len();
        document.designs.retain(|d| d.product_id != product_id);
        let removed = before - document.designs.len();
        if removed == 0 {
            return Ok(0);
        }

        document.repair_current();
        self.write_document(&document).await?;
        tracing::info!(product_id = %product_id, removed, "Designs reset for product");
        Ok(removed)
    }

    pub async fn current_id(&self) -> Result<Option<String>> {
        let _guard = self.gate.lock().await;
        Ok(self.load_live().await?.current_design)
    }

    pub async fn current(&self) -> Result<Option<StoredDesign>> {
        let _guard = self.gate.lock().await;
        let document = self.load_live().await?;
        let Some(current) = document.current_design else {
            return Ok(None);
        };
        Ok(document.designs.into_iter().find(|d| d.id == current))
    }

    /// Point "current" at an existing design
    pub async fn set_current(&self, id: &str) -> Result<()> {
        let _guard = self.gate.lock().await;
        let mut document = self.load_live().await?;
        if document.position(id).is_none() {
            return Err(Error::NotFound(format!("Design {} not found", id)));
        }
        document.current_design = Some(id.to_string());
        self.write_document(&document).await
    }

    /// Drop every design
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.gate.lock().await;
        self.write_document(&DesignDocument::default()).await
    }
}

/// `localStorage://{id}` and `indexedDB://{id}` resolve to the cached raster
/// of the stored design with that id.
#[async_trait::async_trait]
impl PayloadSource for DesignStore {
    async fn load(&self, scheme: StorageScheme, key: &str) -> Result<Option<String>> {
        match scheme {
            StorageScheme::LocalStore | StorageScheme::IndexedStore => Ok(self
                .get_by_id(key)
                .await?
                .and_then(|d| d.design_image_base64)),
            StorageScheme::CdnWrapped => Ok(None),
        }
    }
}
