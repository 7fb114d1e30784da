//! Utility modules for sparkify-etl

pub mod retry;

pub use retry::{retry_retriable, with_timeout, Retried};
