//! Cart attribute contract for attached designs
//!
//! Line attributes (all strings):
//! - `_custom_design`: `"true"`
//! - `_design_image_url`: primary checkout image
//! - `_design_urls`: JSON array of per-element image URLs, in paint order
//! - `_customized_base_image`: optional backup image
//! - `Design 1` … `Design N`: the per-element URLs again, written at preparation
//!
//! Cart attribute `_prepared_design_urls`: `{"urls": [...], "preparedAt": RFC3339}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use customizer_cart::Attributes;
use customizer_common::{Error, ImageReference, Result};
use customizer_designs::{CapturedArtifact, StoredDesign};

pub const CUSTOM_DESIGN: &str = "_custom_design";
pub const DESIGN_IMAGE_URL: &str = "_design_image_url";
pub const DESIGN_URLS: &str = "_design_urls";
pub const CUSTOMIZED_BASE_IMAGE: &str = "_customized_base_image";
pub const DESIGN_ENTRY_PREFIX: &str = "Design ";
pub const PREPARED_DESIGN_URLS: &str = "_prepared_design_urls";

/// Key of the n-th (1-based) per-element entry
pub fn design_entry_key(n: usize) -> String {
    format!("{}{}", DESIGN_ENTRY_PREFIX, n)
}

fn design_entry_index(key: &str) -> Option<usize> {
    key.strip_prefix(DESIGN_ENTRY_PREFIX)?
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
}

/// Design references carried by one cart line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineDesignAttributes {
    pub primary: Option<ImageReference>,
    pub design_urls: Vec<ImageReference>,
    pub customized_base: Option<ImageReference>,
}

impl CartLineDesignAttributes {
    /// Attributes to attach when a design is added to the cart
    ///
    /// The primary image is the capture when there is one, else the first
    /// image element.
    pub fn for_design(design: &StoredDesign, capture: Option<&CapturedArtifact>) -> Result<Self> {
        let design_urls = design
            .paint_order()
            .into_iter()
            .filter_map(|e| e.src())
            .map(|src| {
                ImageReference::parse(src).map_err(|e| {
                    Error::Validation(format!("Design {}: {}", design.id, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let primary = match capture {
            Some(artifact) => Some(artifact.to_reference()),
            None => design_urls.first().cloned(),
        };

        Ok(Self {
            primary,
            design_urls,
            customized_base: None,
        })
    }

    pub fn with_customized_base(mut self, reference: ImageReference) -> Self {
        self.customized_base = Some(reference);
        self
    }

    /// Read the design references from a line's attributes.
    ///
    /// `Ok(None)` when the line carries no design. `Design N` entries are
    /// only consulted when `_design_urls` is absent.
    pub fn from_attributes(attributes: &Attributes) -> Result<Option<Self>> {
        let primary = attributes
            .get(DESIGN_IMAGE_URL)
            .filter(|v| !v.trim().is_empty())
            .map(|v| ImageReference::parse(v))
            .transpose()?;

        let customized_base = attributes
            .get(CUSTOMIZED_BASE_IMAGE)
            .filter(|v| !v.trim().is_empty())
            .map(|v| ImageReference::parse(v))
            .transpose()?;

        let design_urls = match attributes.get(DESIGN_URLS) {
            Some(raw) => {
                let urls: Vec<String> = serde_json::from_str(raw).map_err(|e| {
                    Error::Validation(format!("{} is not a JSON array of strings: {}", DESIGN_URLS, e))
                })?;
                urls.iter()
                    .filter(|u| !u.trim().is_empty())
                    .map(|u| ImageReference::parse(u))
                    .collect::<Result<Vec<_>>>()?
            }
            None => {
                let mut entries: Vec<(usize, &String)> = attributes
                    .iter()
                    .filter_map(|(k, v)| design_entry_index(k).map(|n| (n, v)))
                    .collect();
                entries.sort_by_key(|(n, _)| *n);
                entries
                    .into_iter()
                    .map(|(_, v)| ImageReference::parse(v))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        if primary.is_none() && customized_base.is_none() && design_urls.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            primary: primary.or_else(|| design_urls.first().cloned()),
            design_urls,
            customized_base,
        }))
    }

    /// Every reference on the line, primary first, without duplicates
    pub fn references(&self) -> Vec<&ImageReference> {
        let mut refs: Vec<&ImageReference> = Vec::new();
        let all = self
            .primary
            .iter()
            .chain(self.design_urls.iter())
            .chain(self.customized_base.iter());
        for reference in all {
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }
        refs
    }

    /// Replace each reference with the one `resolve` maps it to
    pub fn map_references<F>(&self, mut resolve: F) -> Self
    where
        F: FnMut(&ImageReference) -> ImageReference,
    {
        Self {
            primary: self.primary.as_ref().map(&mut resolve),
            design_urls: self.design_urls.iter().map(&mut resolve).collect(),
            customized_base: self.customized_base.as_ref().map(&mut resolve),
        }
    }

    fn urls_json(&self) -> String {
        let urls: Vec<String> = self.design_urls.iter().map(ToString::to_string).collect();
        serde_json::Value::from(urls).to_string()
    }

    /// Attribute set written at add-to-cart time
    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(CUSTOM_DESIGN.to_string(), "true".to_string());
        if let Some(primary) = &self.primary {
            attributes.insert(DESIGN_IMAGE_URL.to_string(), primary.to_string());
        }
        if !self.design_urls.is_empty() {
            attributes.insert(DESIGN_URLS.to_string(), self.urls_json());
        }
        if let Some(base) = &self.customized_base {
            attributes.insert(CUSTOMIZED_BASE_IMAGE.to_string(), base.to_string());
        }
        attributes
    }

    /// Canonical attribute set written at checkout preparation
    pub fn to_prepared_attributes(&self) -> Attributes {
        let mut attributes = self.to_attributes();
        for (i, url) in self.design_urls.iter().enumerate() {
            attributes.insert(design_entry_key(i + 1), url.to_string());
        }
        attributes
    }

    /// Merge the prepared set into a line's existing attributes.
    ///
    /// Unrelated attributes are kept; stale `Design N` entries are dropped.
    pub fn merge_into(&self, existing: &Attributes) -> Attributes {
        let mut merged: Attributes = existing
            .iter()
            .filter(|(k, _)| {
                design_entry_index(k).is_none()
                    && k.as_str() != DESIGN_IMAGE_URL
                    && k.as_str() != CUSTOMIZED_BASE_IMAGE
                    && k.as_str() != DESIGN_URLS
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        merged.extend(self.to_prepared_attributes());
        merged
    }
}

/// Whether a line's attributes mark it as carrying a design
pub fn is_custom_design(attributes: &Attributes) -> bool {
    attributes
        .get(CUSTOM_DESIGN)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Cart-level reconciliation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedDesignUrls {
    pub urls: Vec<String>,
    pub prepared_at: DateTime<Utc>,
}

impl PreparedDesignUrls {
    pub fn from_attributes(attributes: &Attributes) -> Option<Self> {
        let raw = attributes.get(PREPARED_DESIGN_URLS)?;
        match serde_json::from_str(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable prepared design URL record");
                None
            }
        }
    }

    pub fn to_attributes(&self) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        attributes.insert(PREPARED_DESIGN_URLS.to_string(), serde_json::to_string(self)?);
        Ok(attributes)
    }
}
