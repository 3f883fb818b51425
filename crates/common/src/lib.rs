//! Shared utilities, configuration, and error handling for the customizer pipeline
//!
//! This crate provides common functionality used across the workspace:
//! - Configuration management following 12-factor principles
//! - The shared error taxonomy
//! - Image references and the payload lookup seam behind opaque ones
//! - A clock seam for time-dependent behavior

pub mod clock;
pub mod config;
pub mod error;
pub mod image_ref;
pub mod payload;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use image_ref::{ImageReference, StorageScheme};
pub use payload::{MemoryPayloadSource, NoPayloads, PayloadSource};
