// src/connection/mod.rs

//! Manages the lifecycle of a single visitor WebSocket connection: registration,
//! navigation event forwarding, live-count pushes and guaranteed cleanup.

mod guard;
mod handler;
pub mod message;

pub use guard::{ConnectionGuard, SlotReservation};
pub use handler::{ConnectionHandler, metadata_from_headers};
pub use message::{ClientMessage, ServerMessage};
