//! Test Helper Utilities
//!
//! Shared utilities for testing sparkify-etl

#![allow(dead_code)]

pub mod datasets;
pub mod db_utils;
pub mod faulty_loader;

pub use datasets::{event, song_line, Dataset, EventBuilder};
pub use faulty_loader::{Fault, FaultyLoader};
