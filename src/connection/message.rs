// src/connection/message.rs

//! JSON frames exchanged with a connected browser.

use crate::core::PagePulseError;
use serde::{Deserialize, Serialize};

/// A navigation event reported by the tracking snippet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    PageView {
        path: String,
        #[serde(default)]
        referrer: String,
    },
    PageExit {
        path: String,
    },
}

impl ClientMessage {
    /// Parses and validates a text frame.
    pub fn parse(text: &str) -> Result<Self, PagePulseError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        let path = match &message {
            ClientMessage::PageView { path, .. } | ClientMessage::PageExit { path } => path,
        };
        if path.trim().is_empty() {
            return Err(PagePulseError::InvalidMessage("path cannot be empty".into()));
        }
        Ok(message)
    }
}

/// A push notification for the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    VisitorCount { count: usize },
}
