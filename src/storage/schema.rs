//! Schema policy shared by every backend: column widths, indexes, and the
//! structural detection of the on-disk schema state.

use tracing::{debug, info};

use super::models::TableNames;
use crate::error::{Error, Result};

/// Width of identifier-like columns (vulnerability id, source key).
pub const ID_WIDTH: u32 = 128;
pub const PLATFORM_WIDTH: u32 = 50;
pub const SEGMENT_WIDTH: u32 = 50;
pub const PACKAGE_WIDTH: u32 = 100;
/// Width of the decoded data-source fields (id, name, url).
pub const SOURCE_FIELD_WIDTH: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Vulnerability,
    Advisory,
    DataSource,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [
        TableKind::Vulnerability,
        TableKind::Advisory,
        TableKind::DataSource,
    ];

    pub fn table_name(self, tables: &TableNames) -> &str {
        match self {
            TableKind::Vulnerability => tables.vulnerability(),
            TableKind::Advisory => tables.advisory(),
            TableKind::DataSource => tables.data_source(),
        }
    }

    /// Table comment, for the backends that support one.
    pub fn description(self) -> &'static str {
        match self {
            TableKind::Vulnerability => "vulnerabilities obtained via Trivy DB",
            TableKind::Advisory => "vulnerability advisories obtained via Trivy DB",
            TableKind::DataSource => "data sources obtained via Trivy DB",
        }
    }

    /// The identifier column widened by the legacy migration.
    pub fn id_column(self) -> &'static str {
        match self {
            TableKind::Vulnerability | TableKind::Advisory => "vulnerability_id",
            TableKind::DataSource => "source_key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub table: TableKind,
    pub columns: &'static [&'static str],
}

impl IndexSpec {
    pub fn column_list(&self) -> String {
        self.columns.join(", ")
    }
}

/// Secondary indexes every backend creates.
pub const INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "v_vulnerability_id_idx",
        table: TableKind::Vulnerability,
        columns: &["vulnerability_id"],
    },
    IndexSpec {
        name: "va_vulnerability_advisories_idx",
        table: TableKind::Advisory,
        columns: &["vulnerability_id", "platform", "segment", "package"],
    },
    IndexSpec {
        name: "va_vulnerability_id_idx",
        table: TableKind::Advisory,
        columns: &["vulnerability_id"],
    },
    IndexSpec {
        name: "va_platform_idx",
        table: TableKind::Advisory,
        columns: &["platform"],
    },
    IndexSpec {
        name: "va_source_idx",
        table: TableKind::Advisory,
        columns: &["platform", "segment"],
    },
    IndexSpec {
        name: "va_source_package_idx",
        table: TableKind::Advisory,
        columns: &["platform", "segment", "package"],
    },
    IndexSpec {
        name: "v_source_key_idx",
        table: TableKind::DataSource,
        columns: &["source_key"],
    },
];

pub fn indexes_for(kind: TableKind) -> impl Iterator<Item = &'static IndexSpec> {
    INDEXES.iter().filter(move |index| index.table == kind)
}

/// One DDL statement and the table it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ddl {
    pub table: String,
    pub sql: String,
}

impl Ddl {
    pub fn new(table: &str, sql: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            sql: sql.into(),
        }
    }
}

/// On-disk schema state, derived from how many of the three tables exist.
///
/// Detection is purely structural: three tables are always treated as the
/// legacy layout, including a schema that is already current. The widening
/// migration is idempotent, so re-applying it to a current schema is
/// harmless. A later layout with the same three tables would be
/// misclassified; an explicit version marker table is the fix once the
/// schema changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Absent,
    Legacy,
    Inconsistent { found: i64 },
}

impl SchemaState {
    pub fn from_table_count(found: i64) -> Self {
        match found {
            0 => SchemaState::Absent,
            3 => SchemaState::Legacy,
            found => SchemaState::Inconsistent { found },
        }
    }
}

/// What `migrate` has to do for a given table count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPlan {
    Create,
    Widen,
}

/// Classify the schema and pick the migration, refusing to touch a schema
/// where only some of the tables exist.
pub fn plan_migration(found: i64, tables: &TableNames) -> Result<MigrationPlan> {
    let state = SchemaState::from_table_count(found);
    debug!(found, state = ?state, tables = %tables, "Detected schema state");
    match state {
        SchemaState::Absent => {
            info!(tables = %tables, "Creating vulnerability tables");
            Ok(MigrationPlan::Create)
        }
        SchemaState::Legacy => {
            info!(tables = %tables, "Tables exist, widening identifier columns");
            Ok(MigrationPlan::Widen)
        }
        SchemaState::Inconsistent { found } => Err(Error::SchemaInconsistent {
            found,
            tables: tables.to_string(),
        }),
    }
}
