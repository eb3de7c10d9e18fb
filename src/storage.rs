//! Destination database layer
//!
//! One driver per supported backend, all behind the [`Driver`] trait the
//! refresh pipeline works against.
//!
//! # Module Structure
//! - `driver`: `Driver` trait and backend detection
//! - `models`: Row types and validated table names
//! - `schema`: Column widths, index policy and schema-state detection
//! - `postgres`, `mysql`, `sqlite`: Backend implementations

mod driver;
mod models;
mod mysql;
mod postgres;
mod schema;
mod sqlite;

use tracing::info;

use crate::error::Result;

// Re-export public types
pub use driver::{Backend, Driver};
pub use models::{
    AdvisoryRow, DEFAULT_ADVISORY_TABLE, DEFAULT_DATA_SOURCE_TABLE, DEFAULT_VULNERABILITY_TABLE,
    DataSource, DataSourceRow, TableNames, VulnRow,
};
pub use mysql::MysqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// Connect to the database a DSN points at and return the matching driver.
pub async fn connect(dsn: &str, tables: TableNames) -> Result<Box<dyn Driver>> {
    let backend = Backend::from_dsn(dsn)?;
    let dsn = backend.normalize_dsn(dsn);
    info!(backend = %backend, "Connecting to destination database");

    let driver: Box<dyn Driver> = match backend {
        Backend::Postgres => Box::new(PostgresDriver::connect(&dsn, tables).await?),
        Backend::Mysql => Box::new(MysqlDriver::connect(&dsn, tables).await?),
        Backend::Sqlite => Box::new(SqliteDriver::connect(&dsn, tables).await?),
    };
    Ok(driver)
}
