//! Read-only access to the Trivy DB snapshot.
//!
//! The snapshot is a hierarchical key-value store: the root holds named
//! collections, and a collection maps keys either to documents or to nested
//! collections. The refresh pipeline only sees it through the traits below.
//!
//! # Module Structure
//! - `bolt`: memory-mapped reader for the bbolt file trivy writes (`trivy.db`)
//! - `memory`: ordered in-memory tree with the same semantics

mod bolt;
mod memory;

use thiserror::Error;

pub use bolt::BoltSnapshot;
pub use memory::MemorySnapshot;

/// Errors raised while reading a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid meta page: {0}")]
    InvalidMeta(String),

    #[error("Corrupt page {pgid}: {reason}")]
    CorruptPage { pgid: u64, reason: String },
}

/// One cursor position: a key and either a document or a nested collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key: &'a [u8],
    /// `None` when the key holds a nested collection.
    pub value: Option<&'a [u8]>,
}

impl Entry<'_> {
    pub fn is_collection(&self) -> bool {
        self.value.is_none()
    }
}

/// Forward-only cursor over a collection, in key order.
pub trait Cursor<'a>: Send {
    /// Move to the first entry. Returns `None` for an empty collection.
    fn first(&mut self) -> Result<Option<Entry<'a>>, SnapshotError>;

    /// Move to the next entry, or to the first one if the cursor was never
    /// positioned. Returns `None` once the collection is exhausted.
    fn next(&mut self) -> Result<Option<Entry<'a>>, SnapshotError>;
}

/// A named grouping inside the snapshot.
pub trait Collection<'a>: Send {
    fn cursor(&self) -> Box<dyn Cursor<'a> + 'a>;

    /// Open the nested collection stored under `key`. Returns `None` when
    /// the key is absent or holds a document.
    fn collection(&self, key: &[u8]) -> Result<Option<Box<dyn Collection<'a> + 'a>>, SnapshotError>;
}

/// A consistent read-only view over the whole snapshot.
///
/// Everything reachable from one `root()` call observes the same state, so
/// a refresh that reads it in many chunks still sees a single snapshot.
pub trait Snapshot: Send + Sync {
    fn root(&self) -> Result<Box<dyn Collection<'_> + '_>, SnapshotError>;
}
