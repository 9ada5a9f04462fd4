// tests/property/mod.rs

//! Property-based tests for PagePulse

pub mod presence_test;
pub mod ranking_test;
