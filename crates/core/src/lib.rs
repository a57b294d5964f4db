//! Core types and configuration for the quoted-spread workspace.
//!
//! This crate provides shared types used across all other crates:
//! - Quote, step-series and bucket-grid types
//! - Symbol-day tables
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, DegenerateSpreadPolicy, MissingPolicy};
pub use error::{Error, FetchError, Result};
pub use types::*;
