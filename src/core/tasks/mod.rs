// src/core/tasks/mod.rs

//! This module contains the long-running background tasks that support the
//! analytics core.

pub mod reset;
