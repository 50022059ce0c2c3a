//! Utility functions and helpers
//!
//! This module provides URL parsing and joining helpers shared by the
//! discovery, token and API clients.

pub mod uri;

// Re-export commonly used utilities
pub use uri::*;
