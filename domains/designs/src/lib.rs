//! Designs domain: editable compositions, local persistence, capture

pub mod capture;
pub mod domain;
pub mod repository;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{
    DesignDraft, DesignElement, DesignPatch, DesignSummary, ElementContent, ElementKind,
    Geometry, StageSize, StoredDesign, TextPatch, TransformPatch, UploadedImage, VariantId,
    MIN_DIMENSION,
};
pub use domain::state::DesignState;

// Re-export repository types
pub use repository::{
    AutoSaveSession, DesignDocument, DesignStore, FileMedium, MemoryMedium, PersistedMedium,
    MAX_AGE_DAYS, MAX_DESIGNS,
};

// Re-export capture types
pub use capture::{
    ArtifactCapture, CapturedArtifact, OverlayGuard, RasterFrame, RenderSurface, PIXEL_RATIO,
};
