//! Storage resolver: turn any image reference into a durable URL
//!
//! - durable `Http` is returned untouched, with no network call
//! - other `Http` and `DataUrl` are uploaded to the image store
//! - `cdnWrapped` opaque references unwrap to their embedded URL
//! - `localStore`/`indexedStore` references are looked up through a
//!   `PayloadSource`, falling back to another URL from the same line
//!
//! Upload failures degrade: the original reference comes back with the
//! error, and the caller keeps going.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use customizer_cdn::{CdnConfig, ImageStore, UploadRequest};
use customizer_common::image_ref::truncate;
use customizer_common::{Error, ImageReference, PayloadSource, StorageScheme};

/// Most uploads in flight at once during a batch
pub const BATCH_SIZE: usize = 3;

/// Resolver settings
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub durable_hosts: Vec<String>,
    pub folder: String,
    /// Upload tries per reference, at least one
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&CdnConfig::default())
    }
}

impl From<&CdnConfig> for ResolverConfig {
    fn from(config: &CdnConfig) -> Self {
        Self {
            durable_hosts: config.durable_hosts.clone(),
            folder: config.folder.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
        }
    }
}

/// One reference to resolve, with same-line alternatives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveJob {
    pub reference: ImageReference,
    pub fallbacks: Vec<ImageReference>,
}

impl ResolveJob {
    pub fn new(reference: ImageReference) -> Self {
        Self {
            reference,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<ImageReference>) -> Self {
        self.fallbacks = fallbacks;
        self
    }
}

/// Outcome of resolving one reference
#[derive(Debug)]
pub enum Resolved {
    /// Durable URL; `uploaded` is false when nothing had to be sent
    Durable { url: String, uploaded: bool },
    /// Could not be made durable; keep the original
    Degraded {
        original: ImageReference,
        error: Error,
    },
}

impl Resolved {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolved::Degraded { .. })
    }

    /// Reference to write back: the durable URL, or the original on degradation
    pub fn reference(&self) -> ImageReference {
        match self {
            Resolved::Durable { url, .. } => ImageReference::Http(url.clone()),
            Resolved::Degraded { original, .. } => original.clone(),
        }
    }

    pub fn durable_url(&self) -> Option<&str> {
        match self {
            Resolved::Durable { url, .. } => Some(url),
            Resolved::Degraded { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Resolved::Durable { .. } => None,
            Resolved::Degraded { error, .. } => Some(error),
        }
    }
}

/// Makes image references durable through an image store
pub struct StorageResolver {
    store: Arc<dyn ImageStore>,
    payloads: Arc<dyn PayloadSource>,
    config: ResolverConfig,
}

impl StorageResolver {
    pub fn new(
        store: Arc<dyn ImageStore>,
        payloads: Arc<dyn PayloadSource>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            payloads,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Whether a reference needs no resolution at all
    pub fn is_durable(&self, reference: &ImageReference) -> bool {
        reference.is_durable(&self.config.durable_hosts)
    }

    /// Resolve one reference
    pub async fn resolve(&self, reference: &ImageReference, fallbacks: &[ImageReference]) -> Resolved {
        match reference {
            ImageReference::Http(_) | ImageReference::DataUrl(_) => {
                self.make_durable(reference, reference).await
            }
            ImageReference::Opaque {
                scheme: StorageScheme::CdnWrapped,
                key,
            } => {
                // Parsing guarantees the embedded value is an http(s) URL
                let embedded = ImageReference::Http(key.clone());
                self.make_durable(&embedded, reference).await
            }
            ImageReference::Opaque { scheme, key } => {
                match self.lookup(*scheme, key).await {
                    Some(payload) => self.make_durable(&payload, reference).await,
                    None => self.substitute(reference, fallbacks).await,
                }
            }
        }
    }

    /// Resolve many references, at most `BATCH_SIZE` at a time.
    ///
    /// A slot frees as soon as its item finishes, whatever its position.
    /// Output order matches input order.
    pub async fn resolve_batch(&self, jobs: &[ResolveJob]) -> Vec<Resolved> {
        let mut indexed: Vec<(usize, Resolved)> = stream::iter(jobs.iter().enumerate())
            .map(|(index, job)| async move {
                (index, self.resolve(&job.reference, &job.fallbacks).await)
            })
            .buffer_unordered(BATCH_SIZE)
            .collect()
            .await;
        indexed.sort_unstable_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, resolved)| resolved).collect()
    }

    /// Fetch the payload behind a storage-scheme reference
    async fn lookup(&self, scheme: StorageScheme, key: &str) -> Option<ImageReference> {
        let payload = match self.payloads.load(scheme, key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::info!(scheme = %scheme, key = %key, "Opaque image payload missing");
                return None;
            }
            Err(e) => {
                tracing::warn!(scheme = %scheme, key = %key, error = %e, "Opaque image lookup failed");
                return None;
            }
        };

        match ImageReference::parse(&payload) {
            Ok(found @ (ImageReference::DataUrl(_) | ImageReference::Http(_))) => Some(found),
            Ok(other) => {
                tracing::warn!(
                    scheme = %scheme,
                    key = %key,
                    payload = %truncate(&other.to_string()),
                    "Opaque image payload is itself opaque"
                );
                None
            }
            Err(e) => {
                tracing::warn!(scheme = %scheme, key = %key, error = %e, "Opaque image payload unreadable");
                None
            }
        }
    }

    /// Use the first `Http` fallback in place of an unresolvable reference
    async fn substitute(&self, original: &ImageReference, fallbacks: &[ImageReference]) -> Resolved {
        match fallbacks.iter().find(|f| f.is_http()) {
            Some(fallback) => {
                tracing::info!(
                    original = %truncate(&original.to_string()),
                    fallback = %fallback,
                    "Substituting fallback for unresolvable image"
                );
                self.make_durable(fallback, original).await
            }
            None => Resolved::Degraded {
                original: original.clone(),
                error: Error::NotFound(format!(
                    "Image {} has no payload and no fallback",
                    truncate(&original.to_string())
                )),
            },
        }
    }

    /// Return `candidate` if already durable, else upload it.
    ///
    /// `original` is what degrades back to the caller on failure.
    async fn make_durable(&self, candidate: &ImageReference, original: &ImageReference) -> Resolved {
        if let Some(url) = candidate.as_http() {
            if self.is_durable(candidate) {
                return Resolved::Durable {
                    url: url.to_string(),
                    uploaded: false,
                };
            }
        }

        match self.upload(candidate).await {
            Ok(url) => Resolved::Durable {
                url,
                uploaded: true,
            },
            Err(error) => Resolved::Degraded {
                original: original.clone(),
                error,
            },
        }
    }

    /// Accept a receipt only if it names a URL on a durable host
    fn check_receipt(&self, label: &str, url: &str) -> Result<String, Error> {
        match ImageReference::parse(url) {
            Ok(reference) if reference.is_http() && self.is_durable(&reference) => {
                Ok(url.to_string())
            }
            _ => {
                tracing::warn!(reference = %label, url = %truncate(url), "Image store receipt rejected");
                Err(Error::Upload {
                    reference: label.to_string(),
                    reason: format!("Image store returned a non-durable URL: {}", truncate(url)),
                })
            }
        }
    }

    async fn upload(&self, candidate: &ImageReference) -> Result<String, Error> {
        let payload = candidate.to_string();
        let label = truncate(&payload);
        let request = UploadRequest::for_payload(payload, self.config.folder.clone());
        let attempts = self.config.max_attempts.max(1);

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.store.upload(request.clone()).await {
                Ok(receipt) => {
                    let url = self.check_receipt(&label, &receipt.url)?;
                    tracing::info!(
                        reference = %label,
                        url = %url,
                        attempt,
                        "Image uploaded to durable store"
                    );
                    return Ok(url);
                }
                Err(e) => {
                    tracing::warn!(reference = %label, attempt, attempts, error = %e, "Image upload failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }

        Err(Error::Upload {
            reference: label,
            reason: last_error,
        })
    }
}
