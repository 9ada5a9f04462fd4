// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
///
/// Analytics operations on unknown identities or unmatched page exits are not
/// errors at all; they are absorbed by the engine as no-ops. The variants below
/// only describe failures of the plumbing around it.
#[derive(Error, Debug)]
pub enum PagePulseError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Analytics engine is not running")]
    EngineUnavailable,

    #[error("Invalid client message: {0}")]
    InvalidMessage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it lives behind an Arc.
impl Clone for PagePulseError {
    fn clone(&self) -> Self {
        match self {
            PagePulseError::Io(e) => PagePulseError::Io(Arc::clone(e)),
            PagePulseError::EngineUnavailable => PagePulseError::EngineUnavailable,
            PagePulseError::InvalidMessage(s) => PagePulseError::InvalidMessage(s.clone()),
            PagePulseError::InvalidRequest(s) => PagePulseError::InvalidRequest(s.clone()),
            PagePulseError::Internal(s) => PagePulseError::Internal(s.clone()),
        }
    }
}

impl PartialEq for PagePulseError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PagePulseError::Io(e1), PagePulseError::Io(e2)) => e1.to_string() == e2.to_string(),
            (PagePulseError::InvalidMessage(s1), PagePulseError::InvalidMessage(s2)) => s1 == s2,
            (PagePulseError::InvalidRequest(s1), PagePulseError::InvalidRequest(s2)) => s1 == s2,
            (PagePulseError::Internal(s1), PagePulseError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for PagePulseError {
    fn from(e: std::io::Error) -> Self {
        PagePulseError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for PagePulseError {
    fn from(e: serde_json::Error) -> Self {
        PagePulseError::InvalidMessage(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for PagePulseError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        PagePulseError::EngineUnavailable
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for PagePulseError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        PagePulseError::EngineUnavailable
    }
}
