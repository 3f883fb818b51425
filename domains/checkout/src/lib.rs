//! Checkout domain: storage resolution and cart materialization

pub mod attributes;
pub mod domain;
pub mod materializer;
pub mod resolver;

// Re-export domain types at the crate root for convenience
pub use attributes::{CartLineDesignAttributes, PreparedDesignUrls};
pub use domain::state::{LineEvent, LineState, LineStateMachine, StateError};

pub use materializer::{CheckoutMaterializer, DegradedImage, LineReport, MaterializationReport};
pub use resolver::{ResolveJob, Resolved, ResolverConfig, StorageResolver, BATCH_SIZE};
