//! PostgreSQL driver

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
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

const COUNT_TABLES: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = current_schema() \
     AND table_name::text IN (lower($1), lower($2), lower($3))";

pub struct PostgresDriver {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresDriver {
    pub fn new(pool: PgPool, tables: TableNames) -> Self {
        Self { pool, tables }
    }

    /// Open a single-connection pool. Statements run strictly one after
    /// another, so one connection is all the refresh ever uses.
    pub async fn connect(dsn: &str, tables: TableNames) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(dsn)
            .await
            .map_err(|e| Error::connection(Backend::Postgres, e))?;
        info!(tables = %tables, "Connected to PostgreSQL");
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

    async fn truncate(&self, table: &str) -> Result<()> {
        sqlx::query(&format!("TRUNCATE TABLE {table}"))
            .execute(&self.pool)
            .await
            .map_err(|e| Error::query("truncate", table, e))?;
        debug!(table = %table, "Truncated table");
        Ok(())
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn tables(&self) -> &TableNames {
        &self.tables
    }

    async fn migrate(&self) -> Result<()> {
        let found = self.count_tables().await?;
        match plan_migration(found, &self.tables)? {
            MigrationPlan::Create => self.execute_ddl("create", &create_statements(&self.tables)).await,
            MigrationPlan::Widen => self.execute_ddl("widen", &widen_statements(&self.tables)).await,
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
        self.truncate(self.tables.vulnerability()).await
    }

    async fn truncate_advisories(&self) -> Result<()> {
        self.truncate(self.tables.advisory()).await
    }

    async fn truncate_data_sources(&self) -> Result<()> {
        self.truncate(self.tables.data_source()).await
    }
}

fn columns(kind: TableKind) -> String {
    match kind {
        TableKind::Vulnerability => format!(
            "id serial PRIMARY KEY, \
             vulnerability_id varchar({ID_WIDTH}) NOT NULL, \
             value json NOT NULL, \
             created_at timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
        ),
        TableKind::Advisory => format!(
            "id serial PRIMARY KEY, \
             vulnerability_id varchar({ID_WIDTH}) NOT NULL, \
             platform varchar({PLATFORM_WIDTH}) NOT NULL, \
             segment varchar({SEGMENT_WIDTH}) NOT NULL, \
             package varchar({PACKAGE_WIDTH}) NOT NULL, \
             value json NOT NULL, \
             created_at timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
        ),
        TableKind::DataSource => format!(
            "id serial PRIMARY KEY, \
             source_key varchar({ID_WIDTH}) NOT NULL, \
             source_id varchar({SOURCE_FIELD_WIDTH}) NOT NULL, \
             source_name varchar({SOURCE_FIELD_WIDTH}) NOT NULL, \
             source_url varchar({SOURCE_FIELD_WIDTH}) NOT NULL, \
             created_at timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
        ),
    }
}

fn create_statements(tables: &TableNames) -> Vec<Ddl> {
    let mut statements = Vec::new();
    for kind in TableKind::ALL {
        let table = kind.table_name(tables);
        statements.push(Ddl::new(
            table,
            format!("CREATE TABLE {table} ({})", columns(kind)),
        ));
        statements.push(Ddl::new(
            table,
            format!("COMMENT ON TABLE {table} IS '{}'", kind.description()),
        ));
        for index in indexes_for(kind) {
            statements.push(Ddl::new(
                table,
                format!(
                    "CREATE INDEX {} ON {table} ({})",
                    index.name,
                    index.column_list()
                ),
            ));
        }
    }
    statements
}

/// Widen the identifier columns of a legacy schema. A no-op rewrite when
/// the columns already have the target type.
fn widen_statements(tables: &TableNames) -> Vec<Ddl> {
    TableKind::ALL
        .into_iter()
        .map(|kind| {
            let table = kind.table_name(tables);
            let column = kind.id_column();
            Ddl::new(
                table,
                format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} TYPE varchar({ID_WIDTH}) USING {column}::varchar"
                ),
            )
        })
        .collect()
}

fn vuln_insert<'a>(table: &str, batch: &'a [VulnRow]) -> QueryBuilder<'a, Postgres> {
    let mut query = QueryBuilder::new(format!("INSERT INTO {table} (vulnerability_id, value) "));
    query.push_values(batch, |mut row, vuln| {
        row.push_bind(vuln.vulnerability_id.as_str())
            .push_bind(vuln.value.as_str())
            .push_unseparated("::json");
    });
    query
}

fn advisory_insert<'a>(table: &str, batch: &'a [AdvisoryRow]) -> QueryBuilder<'a, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "INSERT INTO {table} (vulnerability_id, platform, segment, package, value) "
    ));
    query.push_values(batch, |mut row, advisory| {
        row.push_bind(advisory.vulnerability_id.as_str())
            .push_bind(advisory.platform.as_str())
            .push_bind(advisory.segment.as_str())
            .push_bind(advisory.package.as_str())
            .push_bind(advisory.value.as_str())
            .push_unseparated("::json");
    });
    query
}

fn data_source_insert<'a>(
    table: &str,
    records: &'a [DataSourceRecord<'_>],
) -> QueryBuilder<'a, Postgres> {
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
