// src/core/analytics/agent.rs

//! Best-effort browser and device classification from a raw user-agent string.

use serde::Serialize;
use strum_macros::{Display, EnumString};

/// The browser family a user-agent was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
pub enum Browser {
    Firefox,
    Edge,
    Chrome,
    Safari,
    #[strum(serialize = "Internet Explorer")]
    #[serde(rename = "Internet Explorer")]
    InternetExplorer,
    #[default]
    Unknown,
}

/// The coarse device class a user-agent was matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
pub enum DeviceType {
    Mobile,
    Tablet,
    #[default]
    Desktop,
}

/// Classifies a user-agent into a browser family and device class.
///
/// Matching is plain substring search. Order matters: Edge and Chrome both
/// advertise `Safari`, and Edge also advertises `Chrome`.
pub fn classify(user_agent: &str) -> (Browser, DeviceType) {
    let browser = if user_agent.contains("Firefox") {
        Browser::Firefox
    } else if user_agent.contains("Edg") {
        Browser::Edge
    } else if user_agent.contains("Chrome") {
        Browser::Chrome
    } else if user_agent.contains("Safari") {
        Browser::Safari
    } else if user_agent.contains("MSIE") || user_agent.contains("Trident/") {
        Browser::InternetExplorer
    } else {
        Browser::Unknown
    };

    let device = if user_agent.contains("Mobile") {
        DeviceType::Mobile
    } else if user_agent.contains("Tablet") || user_agent.contains("iPad") {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    };

    (browser, device)
}
