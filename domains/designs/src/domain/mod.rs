//! Design domain model: element entities and the editing state machine

pub mod entities;
pub mod state;
