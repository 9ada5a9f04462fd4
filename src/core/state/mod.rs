// src/core/state/mod.rs

//! Defines the central `ServerState` struct and all related state components.

mod client;
mod core;

pub use client::*;
pub use core::{LogReloadHandle, ServerInit, ServerState};
