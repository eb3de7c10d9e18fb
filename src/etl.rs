//! Full-refresh pipeline from a Trivy DB snapshot into the destination tables.
//!
//! Tables are refreshed one after another: vulnerabilities, data sources,
//! then advisories. Each one is truncated and reloaded in fixed-size batches.
//! There is no transaction spanning a whole table, so a failed run leaves a
//! partially loaded table behind; running the refresh again starts over from
//! an empty table and converges to the same content.
//!
//! # Module Structure
//! - `batch`: Fixed-size row batching

mod batch;

use regex::Regex;
use std::borrow::Cow;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use batch::Batcher;

use crate::error::{Error, Result};
use crate::label::parse_platform_and_segment;
use crate::snapshot::{Collection, Entry, Snapshot, SnapshotError};
use crate::storage::{AdvisoryRow, DataSourceRow, Driver, VulnRow};

/// Flat collection holding one document per vulnerability id.
pub const VULNERABILITY_COLLECTION: &str = "vulnerability";
/// Flat collection holding one document per data source.
pub const DATA_SOURCE_COLLECTION: &str = "data-source";

pub const DEFAULT_BATCH_SIZE: usize = 5000;
/// Largest batch whose advisory insert stays within SQLite's default limit
/// of 32766 bound parameters (five per row).
pub const MAX_BATCH_SIZE: usize = 6553;

const ROOT: &str = "<root>";

/// Allow-list of advisory labels. A label passes when any pattern matches
/// somewhere inside it; an empty list lets every label through.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    patterns: Vec<Regex>,
}

impl SourceFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|e| {
                    Error::Config(format!("invalid source pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn allows(&self, label: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(label))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Rows per insert call, clamped to `1..=MAX_BATCH_SIZE`
    pub batch_size: usize,
    pub sources: SourceFilter,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            sources: SourceFilter::default(),
        }
    }
}

/// Rows written and insert calls issued for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows: usize,
    pub batches: usize,
}

impl TableStats {
    fn record(&mut self, rows: usize) {
        self.rows += rows;
        self.batches += 1;
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub vulnerabilities: TableStats,
    pub data_sources: TableStats,
    pub advisories: TableStats,
    /// Advisory labels that were loaded
    pub labels_walked: usize,
    /// Advisory labels rejected by the allow-list
    pub labels_skipped: usize,
}

/// Runs full refreshes against one driver.
pub struct Refresher<'d> {
    driver: &'d dyn Driver,
    options: RefreshOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'d> Refresher<'d> {
    pub fn new(driver: &'d dyn Driver, options: RefreshOptions) -> Self {
        Self {
            driver,
            options,
            shutdown: None,
        }
    }

    /// Stop between batches once `true` is sent on the channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Reload all three tables from `snapshot`.
    ///
    /// Stops at the first error. A flat collection missing from the snapshot
    /// fails the run before its table is truncated.
    pub async fn run(&self, snapshot: &dyn Snapshot) -> Result<RefreshSummary> {
        let root = snapshot.root().map_err(|e| Error::traversal(ROOT, e))?;
        let mut summary = RefreshSummary::default();

        let vulnerabilities = open_collection(root.as_ref(), VULNERABILITY_COLLECTION)?;
        summary.vulnerabilities = self.refresh_vulns(vulnerabilities).await?;

        let data_sources = open_collection(root.as_ref(), DATA_SOURCE_COLLECTION)?;
        summary.data_sources = self.refresh_data_sources(data_sources).await?;

        self.refresh_advisories(root, &mut summary).await?;

        info!(
            vulnerabilities = summary.vulnerabilities.rows,
            data_sources = summary.data_sources.rows,
            advisories = summary.advisories.rows,
            labels = summary.labels_walked,
            labels_skipped = summary.labels_skipped,
            "Refresh completed"
        );
        Ok(summary)
    }

    async fn refresh_vulns<'a>(&self, collection: Box<dyn Collection<'a> + 'a>) -> Result<TableStats> {
        let table = self.driver.tables().vulnerability();
        info!(table = %table, "Refreshing table");
        self.check_cancelled(table)?;
        self.driver.truncate_vulns().await?;

        let mut stats = TableStats::default();
        let mut batcher = Batcher::new(self.options.batch_size);
        let mut cursor = collection.cursor();
        let mut entry = step(cursor.first(), VULNERABILITY_COLLECTION)?;
        while let Some(Entry { key, value }) = entry {
            match value {
                Some(value) => {
                    let row = VulnRow {
                        vulnerability_id: text(key).into_owned(),
                        value: text(value).into_owned(),
                    };
                    if let Some(batch) = batcher.push(row) {
                        self.insert_vulns(batch, &mut stats).await?;
                    }
                }
                None => skip_nested(VULNERABILITY_COLLECTION, key),
            }
            entry = step(cursor.next(), VULNERABILITY_COLLECTION)?;
        }
        if let Some(batch) = batcher.finish() {
            self.insert_vulns(batch, &mut stats).await?;
        }

        info!(table = %table, rows = stats.rows, batches = stats.batches, "Table refreshed");
        Ok(stats)
    }

    async fn refresh_data_sources<'a>(
        &self,
        collection: Box<dyn Collection<'a> + 'a>,
    ) -> Result<TableStats> {
        let table = self.driver.tables().data_source();
        info!(table = %table, "Refreshing table");
        self.check_cancelled(table)?;
        self.driver.truncate_data_sources().await?;

        let mut stats = TableStats::default();
        let mut batcher = Batcher::new(self.options.batch_size);
        let mut cursor = collection.cursor();
        let mut entry = step(cursor.first(), DATA_SOURCE_COLLECTION)?;
        while let Some(Entry { key, value }) = entry {
            match value {
                Some(document) => {
                    let row = DataSourceRow {
                        source_key: text(key).into_owned(),
                        document: document.to_vec(),
                    };
                    if let Some(batch) = batcher.push(row) {
                        self.insert_data_sources(batch, &mut stats).await?;
                    }
                }
                None => skip_nested(DATA_SOURCE_COLLECTION, key),
            }
            entry = step(cursor.next(), DATA_SOURCE_COLLECTION)?;
        }
        if let Some(batch) = batcher.finish() {
            self.insert_data_sources(batch, &mut stats).await?;
        }

        info!(table = %table, rows = stats.rows, batches = stats.batches, "Table refreshed");
        Ok(stats)
    }

    async fn refresh_advisories<'a>(
        &self,
        root: Box<dyn Collection<'a> + 'a>,
        summary: &mut RefreshSummary,
    ) -> Result<()> {
        let table = self.driver.tables().advisory();
        info!(table = %table, "Refreshing table");
        self.check_cancelled(table)?;
        self.driver.truncate_advisories().await?;

        let mut stats = TableStats::default();
        let mut labels = root.cursor();
        let mut entry = step(labels.first(), ROOT)?;
        while let Some(Entry { key, value }) = entry {
            let label = text(key);
            if value.is_none() && !is_flat_collection(&label) {
                if !self.options.sources.allows(&label) {
                    debug!(label = %label, "Label not allowed, skipping");
                    summary.labels_skipped += 1;
                } else if let Some(collection) =
                    root.collection(key).map_err(|e| Error::traversal(&label, e))?
                {
                    self.load_label(&label, collection, &mut stats).await?;
                    summary.labels_walked += 1;
                }
            }
            entry = step(labels.next(), ROOT)?;
        }

        info!(
            table = %table,
            rows = stats.rows,
            batches = stats.batches,
            labels = summary.labels_walked,
            "Table refreshed"
        );
        summary.advisories = stats;
        Ok(())
    }

    /// Flatten one label into advisory rows. Batches never span labels.
    async fn load_label<'a>(
        &self,
        label: &str,
        collection: Box<dyn Collection<'a> + 'a>,
        stats: &mut TableStats,
    ) -> Result<()> {
        let (platform, segment) = parse_platform_and_segment(label);
        info!(label = %label, platform = %platform, segment = %segment, "Writing security advisories");

        let mut rows = 0usize;
        let mut batcher = Batcher::new(self.options.batch_size);
        let mut packages = collection.cursor();
        let mut package = step(packages.first(), label)?;
        while let Some(Entry { key: package_key, value }) = package {
            // Plain values next to the packages carry no advisories.
            if value.is_none()
                && let Some(advisories) = collection
                    .collection(package_key)
                    .map_err(|e| Error::traversal(label, e))?
            {
                let package_name = text(package_key).into_owned();
                let mut cursor = advisories.cursor();
                let mut entry = step(cursor.first(), label)?;
                while let Some(Entry { key, value }) = entry {
                    match value {
                        Some(value) => {
                            rows += 1;
                            let row = AdvisoryRow {
                                vulnerability_id: text(key).into_owned(),
                                platform: platform.clone(),
                                segment: segment.clone(),
                                package: package_name.clone(),
                                value: text(value).into_owned(),
                            };
                            if let Some(batch) = batcher.push(row) {
                                self.insert_advisories(batch, stats).await?;
                            }
                        }
                        None => skip_nested(label, key),
                    }
                    entry = step(cursor.next(), label)?;
                }
            }
            package = step(packages.next(), label)?;
        }
        if let Some(batch) = batcher.finish() {
            self.insert_advisories(batch, stats).await?;
        }

        debug!(label = %label, rows, "Label loaded");
        Ok(())
    }

    async fn insert_vulns(&self, batch: Vec<VulnRow>, stats: &mut TableStats) -> Result<()> {
        let table = self.driver.tables().vulnerability();
        self.check_cancelled(table)?;
        self.driver.insert_vulns(&batch).await?;
        stats.record(batch.len());
        debug!(table = %table, rows = batch.len(), total = stats.rows, "Inserted batch");
        Ok(())
    }

    async fn insert_data_sources(
        &self,
        batch: Vec<DataSourceRow>,
        stats: &mut TableStats,
    ) -> Result<()> {
        let table = self.driver.tables().data_source();
        self.check_cancelled(table)?;
        self.driver.insert_data_sources(&batch).await?;
        stats.record(batch.len());
        debug!(table = %table, rows = batch.len(), total = stats.rows, "Inserted batch");
        Ok(())
    }

    async fn insert_advisories(
        &self,
        batch: Vec<AdvisoryRow>,
        stats: &mut TableStats,
    ) -> Result<()> {
        let table = self.driver.tables().advisory();
        self.check_cancelled(table)?;
        self.driver.insert_advisories(&batch).await?;
        stats.record(batch.len());
        debug!(table = %table, rows = batch.len(), total = stats.rows, "Inserted batch");
        Ok(())
    }

    fn check_cancelled(&self, table: &str) -> Result<()> {
        match &self.shutdown {
            Some(shutdown) if *shutdown.borrow() => {
                warn!(table = %table, "Refresh cancelled");
                Err(Error::Cancelled {
                    table: table.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

fn open_collection<'a>(
    root: &dyn Collection<'a>,
    name: &str,
) -> Result<Box<dyn Collection<'a> + 'a>> {
    root.collection(name.as_bytes())
        .map_err(|e| Error::traversal(name, e))?
        .ok_or_else(|| Error::traversal(name, "collection not found"))
}

fn step<'a>(
    entry: std::result::Result<Option<Entry<'a>>, SnapshotError>,
    collection: &str,
) -> Result<Option<Entry<'a>>> {
    entry.map_err(|e| Error::traversal(collection, e))
}

fn is_flat_collection(label: &str) -> bool {
    label == VULNERABILITY_COLLECTION || label == DATA_SOURCE_COLLECTION
}

fn skip_nested(collection: &str, key: &[u8]) {
    warn!(
        collection = %collection,
        key = %text(key),
        "Expected a document, found a nested collection; skipping"
    );
}

fn text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
