//! Row types and table naming for the destination database

use serde::de::{self, Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

/// Default table names, matching the ones earlier releases created.
pub const DEFAULT_VULNERABILITY_TABLE: &str = "vulnerabilities";
pub const DEFAULT_ADVISORY_TABLE: &str = "vulnerability_advisories";
pub const DEFAULT_DATA_SOURCE_TABLE: &str = "data_sources";

const MAX_TABLE_NAME_LEN: usize = 63;

/// One row of the vulnerability table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnRow {
    pub vulnerability_id: String,
    /// JSON document, stored verbatim
    pub value: String,
}

/// One row of the advisory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryRow {
    pub vulnerability_id: String,
    pub platform: String,
    pub segment: String,
    pub package: String,
    /// JSON document, stored verbatim
    pub value: String,
}

/// A data-source entry as read from the snapshot, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceRow {
    pub source_key: String,
    pub document: Vec<u8>,
}

/// Decoded data-source document.
///
/// Field names match case-insensitively, with an exact `ID`/`Name`/`URL`
/// key taking precedence. Unknown fields are ignored; missing or `null`
/// fields, and a document that is `null` altogether, decode to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl<'de> Deserialize<'de> for DataSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(fields) = Option::<Map<String, Value>>::deserialize(deserializer)? else {
            return Ok(Self::default());
        };
        Ok(Self {
            id: text_field(&fields, "ID")?,
            name: text_field(&fields, "Name")?,
            url: text_field(&fields, "URL")?,
        })
    }
}

fn text_field<E: de::Error>(fields: &Map<String, Value>, name: &str) -> std::result::Result<String, E> {
    let value = fields.get(name).or_else(|| {
        fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    });
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(E::custom(format!(
            "field `{name}`: expected a string, found {other}"
        ))),
    }
}

/// A data-source row ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceRecord<'a> {
    pub source_key: &'a str,
    pub source: DataSource,
}

/// Decode every document of a batch, failing on the first malformed one so
/// that nothing from the batch gets written.
pub fn decode_data_sources(rows: &[DataSourceRow]) -> Result<Vec<DataSourceRecord<'_>>> {
    rows.iter()
        .map(|row| {
            let source = serde_json::from_slice::<DataSource>(&row.document).map_err(|source| {
                Error::Decode {
                    key: row.source_key.clone(),
                    source,
                }
            })?;
            Ok(DataSourceRecord {
                source_key: &row.source_key,
                source,
            })
        })
        .collect()
}

/// Validated names of the three destination tables.
///
/// Table names are interpolated into SQL, so they are restricted to plain
/// identifiers: an ASCII letter or underscore followed by up to 62 ASCII
/// letters, digits or underscores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    vulnerability: String,
    advisory: String,
    data_source: String,
}

impl TableNames {
    pub fn new(
        vulnerability: impl Into<String>,
        advisory: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Result<Self> {
        let names = Self {
            vulnerability: vulnerability.into(),
            advisory: advisory.into(),
            data_source: data_source.into(),
        };
        for name in names.all() {
            validate_identifier(name)?;
        }
        let [v, a, d] = names.all();
        if v == a || v == d || a == d {
            return Err(Error::Config(format!(
                "table names must be distinct, got {names}"
            )));
        }
        Ok(names)
    }

    pub fn vulnerability(&self) -> &str {
        &self.vulnerability
    }

    pub fn advisory(&self) -> &str {
        &self.advisory
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.vulnerability, &self.advisory, &self.data_source]
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            vulnerability: DEFAULT_VULNERABILITY_TABLE.to_string(),
            advisory: DEFAULT_ADVISORY_TABLE.to_string(),
            data_source: DEFAULT_DATA_SOURCE_TABLE.to_string(),
        }
    }
}

impl fmt::Display for TableNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.vulnerability, self.advisory, self.data_source
        )
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && name.len() <= MAX_TABLE_NAME_LEN {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid table name '{name}'")))
    }
}
