//! Shared utilities
//!
//! Logging helpers and progress bars used across the crate.

pub mod logging;
