//! Backend-independent driver interface

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use super::models::{AdvisoryRow, DataSourceRow, TableNames, VulnRow};
use crate::error::{Error, Result};

/// Destination database flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Mysql,
    Sqlite,
}

impl Backend {
    /// Detect the backend from a connection string's scheme.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        let (scheme, _) = dsn
            .split_once(':')
            .ok_or_else(|| Error::Config("DSN has no scheme (expected e.g. postgres://...)".to_string()))?;
        scheme.parse()
    }

    /// Rewrite the DSN scheme to the one sqlx expects for this backend.
    pub fn normalize_dsn(self, dsn: &str) -> String {
        match dsn.split_once(':') {
            Some((_, rest)) => format!("{}:{}", self.scheme(), rest),
            None => dsn.to_string(),
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Mysql => "mysql",
            Backend::Sqlite => "sqlite",
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            "mysql" | "mariadb" => Ok(Backend::Mysql),
            "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
            other => Err(Error::Config(format!(
                "unsupported backend '{other}'. Supported: postgres, mysql, sqlite"
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Operations the refresh pipeline needs from a destination database.
///
/// Every insert receives a non-empty batch and writes it with a single
/// multi-row statement, so a batch is stored completely or not at all.
/// Truncation keeps the table's columns and indexes.
#[async_trait]
pub trait Driver: Send + Sync {
    fn backend(&self) -> Backend;

    fn tables(&self) -> &TableNames;

    /// Create the tables (none exist) or widen legacy columns (all exist).
    /// Fails with `SchemaInconsistent` without issuing DDL otherwise.
    async fn migrate(&self) -> Result<()>;

    async fn insert_vulns(&self, batch: &[VulnRow]) -> Result<()>;

    async fn insert_advisories(&self, batch: &[AdvisoryRow]) -> Result<()>;

    /// Decodes every document first; a malformed one fails the batch
    /// before anything is written.
    async fn insert_data_sources(&self, batch: &[DataSourceRow]) -> Result<()>;

    async fn truncate_vulns(&self) -> Result<()>;

    async fn truncate_advisories(&self) -> Result<()>;

    async fn truncate_data_sources(&self) -> Result<()>;
}
