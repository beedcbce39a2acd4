//! Shared types for the UpCloud image builder
//!
//! This crate contains the error types and small helpers used across the
//! builder's configuration, client and CLI crates.

pub mod duration;
pub mod error;
pub mod utils;

// Re-export commonly used types
pub use duration::{format_duration, parse_duration, DurationError};
pub use error::{BuilderError, DecodeError, Result, ValidationError, ValidationErrors};
