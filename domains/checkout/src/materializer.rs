//! Checkout materializer
//!
//! Before checkout hand-off, every image a cart line references is made
//! durable and the line's attributes are rewritten to the canonical set.
//! Running it again on a prepared cart uploads nothing and writes nothing.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use customizer_cart::{CartBackend, CartLine};
use customizer_common::image_ref::truncate;
use customizer_common::{Clock, Error, ImageReference, Result, SystemClock};

use crate::attributes::{is_custom_design, CartLineDesignAttributes, PreparedDesignUrls};
use crate::domain::state::{LineEvent, LineState, LineStateMachine};
use crate::resolver::{ResolveJob, Resolved, StorageResolver};

/// An image that kept its original reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedImage {
    pub reference: String,
    pub code: String,
    pub reason: String,
}

/// Outcome for one design-carrying cart line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineReport {
    pub line_id: String,
    pub state: LineState,
    pub degraded_images: Vec<DegradedImage>,
    /// Why the line stayed unprepared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether this run wrote the line's attributes
    pub rewritten: bool,
}

/// Result of one preparation run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationReport {
    pub lines: Vec<LineReport>,
    /// Durable URLs now referenced by the cart, in first-seen order
    pub resolved_urls: Vec<String>,
    /// Uploads performed by this run
    pub uploads: usize,
    /// Timestamp of the cart-level record, when one exists
    pub prepared_at: Option<DateTime<Utc>>,
    /// Failure to write the cart-level record; lines are unaffected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation_error: Option<String>,
}

impl MaterializationReport {
    pub fn line(&self, line_id: &str) -> Option<&LineReport> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn degraded_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| l.state == LineState::PreparedWithDegradedImage)
            .map(|l| l.line_id.clone())
            .collect()
    }

    pub fn unprepared_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| !l.state.is_prepared())
            .map(|l| l.line_id.clone())
            .collect()
    }

    /// Whether every design line is prepared with durable images only
    pub fn is_fully_prepared(&self) -> bool {
        self.lines.iter().all(|l| l.state == LineState::Prepared)
    }

    /// `PartialMaterialization` naming the degraded lines, if any
    pub fn partial_error(&self) -> Option<Error> {
        let degraded_lines = self.degraded_lines();
        if degraded_lines.is_empty() {
            None
        } else {
            Some(Error::PartialMaterialization { degraded_lines })
        }
    }
}

fn advance(state: LineState, event: LineEvent) -> Result<LineState> {
    LineStateMachine::transition(state, event).map_err(|e| Error::Internal(e.to_string()))
}

/// A cart line parsed into design references
struct PendingLine<'a> {
    line: &'a CartLine,
    design: CartLineDesignAttributes,
}

/// Prepares cart lines for checkout
pub struct CheckoutMaterializer {
    cart: Arc<dyn CartBackend>,
    resolver: Arc<StorageResolver>,
    clock: Arc<dyn Clock>,
}

impl CheckoutMaterializer {
    pub fn new(cart: Arc<dyn CartBackend>, resolver: Arc<StorageResolver>) -> Self {
        Self {
            cart,
            resolver,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Make every design image in the cart durable and rewrite line attributes.
    ///
    /// Fails only when the cart itself cannot be read. Degraded images and
    /// failed line writes are reported per line.
    pub async fn prepare(&self) -> Result<MaterializationReport> {
        let cart = self
            .cart
            .get_cart()
            .await
            .map_err(|e| Error::CartUnavailable(e.to_string()))?;

        let mut reports: Vec<LineReport> = Vec::new();
        let mut pending: Vec<PendingLine> = Vec::new();

        for line in &cart.lines {
            let failure = match CartLineDesignAttributes::from_attributes(&line.attributes) {
                Ok(Some(design)) => {
                    pending.push(PendingLine { line, design });
                    continue;
                }
                Ok(None) if is_custom_design(&line.attributes) => Error::Validation(format!(
                    "Cart line {} is marked as a custom design but carries no design image",
                    line.id
                )),
                Ok(None) => continue,
                Err(e) => e,
            };
            tracing::warn!(line_id = %line.id, error = %failure, "Cart line design attributes unreadable");
            let state = advance(advance(LineState::Unprepared, LineEvent::Begin)?, LineEvent::Abort)?;
            reports.push(LineReport {
                line_id: line.id.clone(),
                state,
                degraded_images: Vec::new(),
                error: Some(failure.to_string()),
                rewritten: false,
            });
        }

        let jobs = self.collect_jobs(&pending);
        let results: Vec<Resolved> = if jobs.is_empty() {
            Vec::new()
        } else {
            tracing::info!(jobs = jobs.len(), lines = pending.len(), "Resolving cart design images");
            self.resolver.resolve_batch(&jobs).await
        };
        let uploads = results
            .iter()
            .filter(|r| matches!(r, Resolved::Durable { uploaded: true, .. }))
            .count();
        let outcomes: HashMap<&ImageReference, &Resolved> = jobs
            .iter()
            .map(|j| &j.reference)
            .zip(results.iter())
            .collect();

        let mut resolved_urls: Vec<String> = Vec::new();
        for entry in &pending {
            let report = self.prepare_line(entry, &outcomes, &mut resolved_urls).await?;
            reports.push(report);
        }

        // Report lines in cart order
        let order: HashMap<&str, usize> = cart
            .lines
            .iter()
            .enumerate()
            .map(|(i, l)| (l.id.as_str(), i))
            .collect();
        reports.sort_by_key(|r| order.get(r.line_id.as_str()).copied().unwrap_or(usize::MAX));

        let mut report = MaterializationReport {
            lines: reports,
            resolved_urls,
            uploads,
            prepared_at: None,
            reconciliation_error: None,
        };
        self.record_prepared_urls(&cart.attributes, &mut report).await;

        tracing::info!(
            lines = report.lines.len(),
            uploads = report.uploads,
            degraded = report.degraded_lines().len(),
            unprepared = report.unprepared_lines().len(),
            "Checkout preparation finished"
        );
        Ok(report)
    }

    /// One job per distinct non-durable reference across the cart.
    ///
    /// A job's fallbacks are the other `Http` references on every line
    /// that carries it.
    fn collect_jobs(&self, pending: &[PendingLine]) -> Vec<ResolveJob> {
        let mut jobs: Vec<ResolveJob> = Vec::new();
        let mut index: HashMap<ImageReference, usize> = HashMap::new();

        for entry in pending {
            let references = entry.design.references();
            for reference in &references {
                if self.resolver.is_durable(reference) {
                    continue;
                }
                let slot = *index.entry((*reference).clone()).or_insert_with(|| {
                    jobs.push(ResolveJob::new((*reference).clone()));
                    jobs.len() - 1
                });
                let job = &mut jobs[slot];
                for candidate in &references {
                    if candidate.is_http()
                        && *candidate != *reference
                        && !job.fallbacks.contains(candidate)
                    {
                        job.fallbacks.push((*candidate).clone());
                    }
                }
            }
        }
        jobs
    }

    async fn prepare_line(
        &self,
        entry: &PendingLine<'_>,
        outcomes: &HashMap<&ImageReference, &Resolved>,
        resolved_urls: &mut Vec<String>,
    ) -> Result<LineReport> {
        let line = entry.line;
        let mut state = advance(LineState::Unprepared, LineEvent::Begin)?;

        let mut degraded_images: Vec<DegradedImage> = Vec::new();
        for reference in entry.design.references() {
            if let Some(Resolved::Degraded { original, error }) = outcomes.get(reference).copied() {
                degraded_images.push(DegradedImage {
                    reference: truncate(&original.to_string()),
                    code: error.error_code().to_string(),
                    reason: error.to_string(),
                });
            }
        }

        let resolved = entry.design.map_references(|reference| {
            outcomes
                .get(reference)
                .map_or_else(|| reference.clone(), |outcome| outcome.reference())
        });
        let attributes = resolved.merge_into(&line.attributes);

        let rewritten = attributes != line.attributes;
        if rewritten {
            if let Err(e) = self
                .cart
                .update_line_attributes(&line.id, attributes)
                .await
            {
                tracing::warn!(line_id = %line.id, error = %e, "Failed to write prepared line attributes");
                state = advance(state, LineEvent::Abort)?;
                return Ok(LineReport {
                    line_id: line.id.clone(),
                    state,
                    degraded_images,
                    error: Some(e.to_string()),
                    rewritten: false,
                });
            }
        }

        for reference in resolved.references() {
            if let Some(url) = reference.as_http() {
                if self.resolver.is_durable(reference) && !resolved_urls.iter().any(|u| u == url) {
                    resolved_urls.push(url.to_string());
                }
            }
        }

        state = if degraded_images.is_empty() {
            advance(state, LineEvent::Complete)?
        } else {
            tracing::warn!(
                line_id = %line.id,
                degraded = degraded_images.len(),
                "Cart line prepared with degraded image"
            );
            advance(state, LineEvent::CompleteDegraded)?
        };
        tracing::debug!(line_id = %line.id, state = %state, rewritten, "Cart line prepared");

        Ok(LineReport {
            line_id: line.id.clone(),
            state,
            degraded_images,
            error: None,
            rewritten,
        })
    }

    /// Write the cart-level URL record unless its URL set is unchanged
    async fn record_prepared_urls(
        &self,
        cart_attributes: &customizer_cart::Attributes,
        report: &mut MaterializationReport,
    ) {
        if report.resolved_urls.is_empty() {
            return;
        }

        let existing = PreparedDesignUrls::from_attributes(cart_attributes);
        let wanted: BTreeSet<&String> = report.resolved_urls.iter().collect();
        if let Some(existing) = existing {
            let current: BTreeSet<&String> = existing.urls.iter().collect();
            if current == wanted {
                report.prepared_at = Some(existing.prepared_at);
                return;
            }
        }

        let record = PreparedDesignUrls {
            urls: report.resolved_urls.clone(),
            prepared_at: self.clock.now(),
        };
        let written = match record.to_attributes() {
            Ok(attributes) => self
                .cart
                .update_cart_attributes(attributes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(()) => report.prepared_at = Some(record.prepared_at),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record prepared design URLs on the cart");
                report.reconciliation_error = Some(e);
            }
        }
    }
}
