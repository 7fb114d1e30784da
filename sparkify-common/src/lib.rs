//! # Sparkify Common Library
//!
//! Shared code for the Sparkify ETL crates including:
//! - Error types
//! - Configuration loading and path resolution
//! - SQLite star-schema initialization and reset
//! - Epoch-millisecond time helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod time;

pub use config::{Backend, EtlConfig};
pub use error::{Error, Result};
