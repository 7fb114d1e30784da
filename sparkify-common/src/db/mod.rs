//! SQLite star schema: initialization, reset and row counts

pub mod init;
pub mod schema;

pub use init::*;
pub use schema::{STAGING_TABLES, STAR_TABLES};
