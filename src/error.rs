//! Error types for trivy-db-sync.

use thiserror::Error;

/// Errors returned by schema migration and table refresh operations.
///
/// Every top-level call (`Driver::migrate`, `Refresher::run`) stops at the
/// first error and returns it as-is. Nothing is retried internally.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection failed ({target}): {reason}")]
    Connection { target: String, reason: String },

    #[error("Inconsistent schema: found {found} of 3 expected tables ({tables})")]
    SchemaInconsistent { found: i64, tables: String },

    #[error("[{operation}] schema migration failed on table '{table}': {source}")]
    SchemaMigration {
        operation: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to decode data source '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("[{operation}] query failed on table '{table}': {source}")]
    Query {
        operation: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to traverse snapshot collection '{collection}': {reason}")]
    SourceTraversal { collection: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Refresh cancelled while loading table '{table}'")]
    Cancelled { table: String },
}

impl Error {
    pub(crate) fn connection(target: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn query(operation: &'static str, table: &str, source: sqlx::Error) -> Self {
        Self::Query {
            operation,
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn migration(operation: &'static str, table: &str, source: sqlx::Error) -> Self {
        Self::SchemaMigration {
            operation,
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn traversal(collection: &str, reason: impl std::fmt::Display) -> Self {
        Self::SourceTraversal {
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Table the failing operation was working on, when there is one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::SchemaMigration { table, .. }
            | Self::Query { table, .. }
            | Self::Cancelled { table } => Some(table),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
