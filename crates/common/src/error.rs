//! Common error types and handling for the customizer pipeline

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the design and checkout domains
///
/// Messages always name the design id, element id, cart line id or image
/// reference involved so a caller can retry narrowly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Upload error for {reference}: {reason}")]
    Upload { reference: String, reason: String },

    #[error("Partial materialization: {} line(s) kept a non-durable image: {}", degraded_lines.len(), degraded_lines.join(", "))]
    PartialMaterialization { degraded_lines: Vec<String> },

    #[error("Storage write error: {0}")]
    StorageWrite(String),

    #[error("Cart unavailable: {0}")]
    CartUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code used in logs and reports
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Capture(_) => "CAPTURE_ERROR",
            Error::Upload { .. } => "UPLOAD_ERROR",
            Error::PartialMaterialization { .. } => "PARTIAL_MATERIALIZATION",
            Error::StorageWrite(_) => "STORAGE_WRITE_ERROR",
            Error::CartUnavailable(_) => "CART_UNAVAILABLE",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

}
