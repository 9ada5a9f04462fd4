// src/core/mod.rs

//! The analytics core: state, the single-writer event pipeline, and the
//! maintenance tasks around it.

pub mod analytics;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod state;
pub mod tasks;

pub use errors::PagePulseError;
