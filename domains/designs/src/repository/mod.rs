//! Local persistence for designs

pub mod autosave;
pub mod designs;
pub mod medium;

pub use autosave::AutoSaveSession;
pub use designs::{DesignDocument, DesignStore, MAX_AGE_DAYS, MAX_DESIGNS};
pub use medium::{FileMedium, MemoryMedium, PersistedMedium};
