//! Checkout domain model

pub mod state;
