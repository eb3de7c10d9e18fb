//! Full-refresh loader from the Trivy vulnerability DB into relational tables.
//!
//! - [`snapshot`]: read-only access to `trivy.db`
//! - [`storage`]: destination drivers for PostgreSQL, MySQL and SQLite
//! - [`etl`]: the refresh pipeline tying the two together
//! - [`label`]: platform/segment derivation from advisory labels

pub mod config;
pub mod error;
pub mod etl;
pub mod label;
pub mod logging;
pub mod snapshot;
pub mod storage;

pub use error::{Error, Result};
