//! SQLite driver
//!
//! SQLite does not enforce `VARCHAR(n)` widths, so the declared widths only
//! document the schema and the legacy "widening" step reduces to making sure
//! the current indexes exist. Truncation is a drop and recreate inside one
//! transaction, which also resets the AUTOINCREMENT counter.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

use super::driver::{Backend, Driver};
use super::models::{
    AdvisoryRow, DataSourceRecord, DataSourceRow, TableNames, VulnRow, decode_data_sources,
};
use super::schema::{
    Ddl, ID_WIDTH, MigrationPlan, PACKAGE_WIDTH, PLATFORM_WIDTH, SEGMENT_WIDTH,
    SOURCE_FIELD_WIDTH, TableKind, indexes_for, plan_migration,
};
use crate::error::{Error, Result};

const COUNT_TABLES: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2, ?3)";

pub struct SqliteDriver {
    pool: SqlitePool,
    tables: TableNames,
}

impl SqliteDriver {
    pub fn new(pool: SqlitePool, tables: TableNames) -> Self {
        Self { pool, tables }
    }

    /// Open the database file, creating it when missing.
    pub async fn connect(dsn: &str, tables: TableNames) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| Error::connection(Backend::Sqlite, e))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::connection(Backend::Sqlite, e))?;

        let sqlite_version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        info!(tables = %tables, sqlite_version = %sqlite_version, "Connected to SQLite");
        Ok(Self::new(pool, tables))
    }

    async fn count_tables(&self) -> Result<i64> {
        let [vulnerability, advisory, data_source] = self.tables.all();
        sqlx::query_scalar::<_, i64>(COUNT_TABLES)
            .bind(vulnerability)
            .bind(advisory)
            .bind(data_source)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::migration("detect", &self.tables.to_string(), e))
    }

    async fn execute_ddl(&self, operation: &'static str, statements: &[Ddl]) -> Result<()> {
        for ddl in statements {
            debug!(table = %ddl.table, sql = %ddl.sql, "Executing DDL");
            sqlx::query(&ddl.sql)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::migration(operation, &ddl.table, e))?;
        }
        Ok(())
    }

    async fn truncate(&self, kind: TableKind) -> Result<()> {
        let table = kind.table_name(&self.tables);
        let mut statements = vec![format!("DROP TABLE IF EXISTS {table}")];
        statements.extend(table_statements(kind, &self.tables).into_iter().map(|ddl| ddl.sql));

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::query("truncate", table, e))?;
        for sql in &statements {
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::query("truncate", table, e))?;
        }
        tx.commit()
            .await
            .map_err(|e| Error::query("truncate", table, e))?;
        debug!(table = %table, "Recreated table");
        Ok(())
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn tables(&self) -> &TableNames {
        &self.tables
    }

    async fn migrate(&self) -> Result<()> {
        let found = self.count_tables().await?;
        match plan_migration(found, &self.tables)? {
            MigrationPlan::Create => self.execute_ddl("create", &create_statements(&self.tables)).await,
            MigrationPlan::Widen => self.execute_ddl("widen", &index_statements(&self.tables)).await,
        }
    }

    async fn insert_vulns(&self, batch: &[VulnRow]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = self.tables.vulnerability();
        let mut query = vuln_insert(table, batch);
        query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::query("insert", table, e))?;
        Ok(())
    }

    async fn insert_advisories(&self, batch: &[AdvisoryRow]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = self.tables.advisory();
        let mut query = advisory_insert(table, batch);
        query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::query("insert", table, e))?;
        Ok(())
    }

    async fn insert_data_sources(&self, batch: &[DataSourceRow]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let records = decode_data_sources(batch)?;
        let table = self.tables.data_source();
        let mut query = data_source_insert(table, &records);
        query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::query("insert", table, e))?;
        Ok(())
    }

    async fn truncate_vulns(&self) -> Result<()> {
        self.truncate(TableKind::Vulnerability).await
    }

    async fn truncate_advisories(&self) -> Result<()> {
        self.truncate(TableKind::Advisory).await
    }

    async fn truncate_data_sources(&self) -> Result<()> {
        self.truncate(TableKind::DataSource).await
    }
}

fn columns(kind: TableKind) -> String {
    match kind {
        TableKind::Vulnerability => format!(
            "id INTEGER PRIMARY KEY AUTOINCREMENT, \
             vulnerability_id VARCHAR({ID_WIDTH}) NOT NULL, \
             value TEXT NOT NULL, \
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP"
        ),
        TableKind::Advisory => format!(
            "id INTEGER PRIMARY KEY AUTOINCREMENT, \
             vulnerability_id VARCHAR({ID_WIDTH}) NOT NULL, \
             platform VARCHAR({PLATFORM_WIDTH}) NOT NULL, \
             segment VARCHAR({SEGMENT_WIDTH}) NOT NULL, \
             package VARCHAR({PACKAGE_WIDTH}) NOT NULL, \
             value TEXT NOT NULL, \
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP"
        ),
        TableKind::DataSource => format!(
            "id INTEGER PRIMARY KEY AUTOINCREMENT, \
             source_key VARCHAR({ID_WIDTH}) NOT NULL, \
             source_id VARCHAR({SOURCE_FIELD_WIDTH}) NOT NULL, \
             source_name VARCHAR({SOURCE_FIELD_WIDTH}) NOT NULL, \
             source_url VARCHAR({SOURCE_FIELD_WIDTH}) NOT NULL, \
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP"
        ),
    }
}

fn indexes(kind: TableKind, table: &str) -> impl Iterator<Item = Ddl> + '_ {
    indexes_for(kind).map(move |index| {
        Ddl::new(
            table,
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
                index.name,
                index.column_list()
            ),
        )
    })
}

/// Table definition plus its indexes.
fn table_statements(kind: TableKind, tables: &TableNames) -> Vec<Ddl> {
    let table = kind.table_name(tables);
    let mut statements = vec![Ddl::new(
        table,
        format!("CREATE TABLE IF NOT EXISTS {table} ({})", columns(kind)),
    )];
    statements.extend(indexes(kind, table));
    statements
}

fn create_statements(tables: &TableNames) -> Vec<Ddl> {
    TableKind::ALL
        .into_iter()
        .flat_map(|kind| table_statements(kind, tables))
        .collect()
}

fn index_statements(tables: &TableNames) -> Vec<Ddl> {
    TableKind::ALL
        .into_iter()
        .flat_map(|kind| indexes(kind, kind.table_name(tables)).collect::<Vec<_>>())
        .collect()
}

fn vuln_insert<'a>(table: &str, batch: &'a [VulnRow]) -> QueryBuilder<'a, Sqlite> {
    let mut query = QueryBuilder::new(format!("INSERT INTO {table} (vulnerability_id, value) "));
    query.push_values(batch, |mut row, vuln| {
        row.push_bind(vuln.vulnerability_id.as_str())
            .push_bind(vuln.value.as_str());
    });
    query
}

fn advisory_insert<'a>(table: &str, batch: &'a [AdvisoryRow]) -> QueryBuilder<'a, Sqlite> {
    let mut query = QueryBuilder::new(format!(
        "INSERT INTO {table} (vulnerability_id, platform, segment, package, value) "
    ));
    query.push_values(batch, |mut row, advisory| {
        row.push_bind(advisory.vulnerability_id.as_str())
            .push_bind(advisory.platform.as_str())
            .push_bind(advisory.segment.as_str())
            .push_bind(advisory.package.as_str())
            .push_bind(advisory.value.as_str());
    });
    query
}

fn data_source_insert<'a>(
    table: &str,
    records: &'a [DataSourceRecord<'_>],
) -> QueryBuilder<'a, Sqlite> {
    let mut query = QueryBuilder::new(format!(
        "INSERT INTO {table} (source_key, source_id, source_name, source_url) "
    ));
    query.push_values(records, |mut row, record| {
        row.push_bind(record.source_key)
            .push_bind(record.source.id.as_str())
            .push_bind(record.source.name.as_str())
            .push_bind(record.source.url.as_str());
    });
    query
}
