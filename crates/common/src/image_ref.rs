//! Image references and their storage schemes
//!
//! Every image a design or cart line points at is one of:
//! - `https://…` / `http://…` - directly fetchable
//! - `data:image/png;base64,…` - inline image data
//! - `cloudinary://https://…` - a CDN URL wrapped in a storage scheme
//! - `localStorage://{key}` - a payload held in the local design store
//! - `indexedDB://{key}` - a payload held in browser-side blob storage
//!
//! Strings are parsed once at the boundary into [`ImageReference`]; nothing
//! downstream re-inspects the raw prefix.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Matches the header of a data URL: `data:[<mime>][;param]*,`
static DATA_URL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)^data:(?P<mime>[\w.+-]+/[\w.+-]+)?(?P<params>(?:;[^;,]*)*),(?P<data>.*)$")
        .expect("data URL regex is valid")
});

/// Storage scheme of an opaque reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageScheme {
    LocalStore,
    IndexedStore,
    CdnWrapped,
}

impl StorageScheme {
    /// URL-style prefix this scheme is written with
    pub fn prefix(&self) -> &'static str {
        match self {
            StorageScheme::LocalStore => "localStorage://",
            StorageScheme::IndexedStore => "indexedDB://",
            StorageScheme::CdnWrapped => "cloudinary://",
        }
    }

    const ALL: [StorageScheme; 3] = [
        StorageScheme::LocalStore,
        StorageScheme::IndexedStore,
        StorageScheme::CdnWrapped,
    ];
}

impl fmt::Display for StorageScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageScheme::LocalStore => write!(f, "localStore"),
            StorageScheme::IndexedStore => write!(f, "indexedStore"),
            StorageScheme::CdnWrapped => write!(f, "cdnWrapped"),
        }
    }
}

/// A logical image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageReference {
    /// Directly fetchable http(s) URL
    Http(String),
    /// Full `data:` URL, header included
    DataUrl(String),
    /// Storage-scheme reference that must be resolved before use
    Opaque { scheme: StorageScheme, key: String },
}

impl ImageReference {
    /// Parse a raw reference string
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Validation("Image reference is empty".to_string()));
        }

        if raw.starts_with("data:") {
            if !DATA_URL_REGEX.is_match(raw) {
                return Err(Error::Validation(format!(
                    "Malformed data URL: {}",
                    truncate(raw)
                )));
            }
            return Ok(ImageReference::DataUrl(raw.to_string()));
        }

        if let Some(scheme) = StorageScheme::ALL
            .into_iter()
            .find(|s| raw.starts_with(s.prefix()))
        {
            let key = &raw[scheme.prefix().len()..];
            if key.is_empty() {
                return Err(Error::Validation(format!(
                    "Opaque reference has an empty key: {}",
                    raw
                )));
            }
            if scheme == StorageScheme::CdnWrapped && !is_http(key) {
                return Err(Error::Validation(format!(
                    "Wrapped CDN reference must embed an http(s) URL: {}",
                    raw
                )));
            }
            return Ok(ImageReference::Opaque {
                scheme,
                key: key.to_string(),
            });
        }

        if is_http(raw) {
            reqwest::Url::parse(raw)
                .map_err(|e| Error::Validation(format!("Invalid image URL {}: {}", raw, e)))?;
            return Ok(ImageReference::Http(raw.to_string()));
        }

        Err(Error::Validation(format!(
            "Unrecognized image reference: {}",
            truncate(raw)
        )))
    }

    /// Build an opaque reference
    pub fn opaque(scheme: StorageScheme, key: impl Into<String>) -> Self {
        ImageReference::Opaque {
            scheme,
            key: key.into(),
        }
    }

    /// Check if this is a plain http(s) URL
    pub fn is_http(&self) -> bool {
        matches!(self, ImageReference::Http(_))
    }

    /// The URL if this is a plain http(s) reference
    pub fn as_http(&self) -> Option<&str> {
        match self {
            ImageReference::Http(url) => Some(url),
            _ => None,
        }
    }

    /// Whether this is an http(s) URL served from one of `durable_hosts`
    ///
    /// A host matches when it equals a durable host or is a subdomain of it.
    pub fn is_durable<S: AsRef<str>>(&self, durable_hosts: &[S]) -> bool {
        let Some(url) = self.as_http() else {
            return false;
        };
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        durable_hosts.iter().any(|durable| {
            let durable = durable.as_ref().trim().to_ascii_lowercase();
            !durable.is_empty()
                && (host == durable || host.ends_with(&format!(".{}", durable)))
        })
    }

    /// Media type of a data URL (`image/png`, …), if declared
    pub fn media_type(&self) -> Option<&str> {
        match self {
            ImageReference::DataUrl(raw) => DATA_URL_REGEX
                .captures(raw)
                .and_then(|c| c.name("mime"))
                .map(|m| m.as_str()),
            _ => None,
        }
    }

    /// Decode the bytes carried by a data URL
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        let ImageReference::DataUrl(raw) = self else {
            return Err(Error::Validation(format!(
                "Not a data URL: {}",
                truncate(&self.to_string())
            )));
        };
        let captures = DATA_URL_REGEX
            .captures(raw)
            .ok_or_else(|| Error::Validation("Malformed data URL".to_string()))?;
        let params = captures.name("params").map_or("", |m| m.as_str());
        let data = captures.name("data").map_or("", |m| m.as_str());

        if params.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
            base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| Error::Validation(format!("Invalid base64 payload: {}", e)))
        } else {
            Ok(data.as_bytes().to_vec())
        }
    }

    /// Build a base64 data URL from raw bytes
    pub fn data_url_from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        ImageReference::DataUrl(format!(
            "data:{};base64,{}",
            media_type,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ))
    }
}

fn is_http(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Shorten long payloads for error messages and logs
pub fn truncate(raw: &str) -> String {
    const LIMIT: usize = 64;
    match raw.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &raw[..idx]),
        None => raw.to_string(),
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageReference::Http(url) => write!(f, "{}", url),
            ImageReference::DataUrl(raw) => write!(f, "{}", raw),
            ImageReference::Opaque { scheme, key } => write!(f, "{}{}", scheme.prefix(), key),
        }
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ImageReference::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        ImageReference::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(reference: ImageReference) -> Self {
        reference.to_string()
    }
}
