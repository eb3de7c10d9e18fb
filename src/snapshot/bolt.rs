//! Read-only reader for bbolt database files
//!
//! Layout (all integers little-endian):
//! ```text
//! page header: id u64 | flags u16 | count u16 | overflow u32
//! meta:        magic u32 | version u32 | page_size u32 | flags u32
//!              | root u64 | sequence u64 | freelist u64 | pgid u64
//!              | txid u64 | checksum u64 (FNV-1a over the preceding bytes)
//! leaf elem:   flags u32 | pos u32 | ksize u32 | vsize u32
//! branch elem: pos u32 | ksize u32 | pgid u64
//! bucket:      root u64 | sequence u64 [| inline leaf page when root == 0]
//! ```
//! `pos` is relative to the element's own offset in the page.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use super::{Collection, Cursor, Entry, Snapshot, SnapshotError};

const MAGIC: u32 = 0xED0C_DAED;
const VERSION: u32 = 2;
const DEFAULT_PAGE_SIZE: usize = 4096;
const MIN_PAGE_SIZE: usize = 512;

const PAGE_HEADER_SIZE: usize = 16;
const ELEMENT_SIZE: usize = 16;
const BUCKET_HEADER_SIZE: usize = 16;
const META_SIZE: usize = 64;
const META_CHECKSUM_OFFSET: usize = 56;

const BRANCH_PAGE: u16 = 0x01;
const LEAF_PAGE: u16 = 0x02;
#[cfg(test)]
const META_PAGE: u16 = 0x04;
const BUCKET_LEAF_FLAG: u32 = 0x01;

/// Memory-mapped bbolt file, read through its newest valid meta page.
pub struct BoltSnapshot {
    map: Mmap,
    page_size: usize,
    root: u64,
    txid: u64,
}

#[derive(Debug, Clone, Copy)]
struct Meta {
    page_size: usize,
    root: u64,
    txid: u64,
}

impl BoltSnapshot {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: mapped read-only; trivy replaces trivy.db by rename, so the
        // mapped inode is never truncated while we hold it.
        let map = unsafe { Mmap::map(&file)? };
        let meta = select_meta(&map)?;

        debug!(
            path = %path.display(),
            page_size = meta.page_size,
            root = meta.root,
            txid = meta.txid,
            "Opened bbolt snapshot"
        );

        Ok(Self {
            map,
            page_size: meta.page_size,
            root: meta.root,
            txid: meta.txid,
        })
    }

    /// Transaction id of the meta page in use.
    pub fn txid(&self) -> u64 {
        self.txid
    }

    fn page(&self, pgid: u64) -> Result<Page<'_>, SnapshotError> {
        let start = usize::try_from(pgid)
            .ok()
            .and_then(|id| id.checked_mul(self.page_size))
            .filter(|start| start + PAGE_HEADER_SIZE <= self.map.len())
            .ok_or_else(|| corrupt(pgid, "page offset beyond end of file"))?;
        let overflow = read_u32(&self.map, start + 12)
            .ok_or_else(|| corrupt(pgid, "truncated page header"))? as usize;
        let end = (overflow + 1)
            .checked_mul(self.page_size)
            .and_then(|len| start.checked_add(len))
            .filter(|end| *end <= self.map.len())
            .ok_or_else(|| corrupt(pgid, "page overflows end of file"))?;
        Page::parse(pgid, &self.map[start..end])
    }
}

impl Snapshot for BoltSnapshot {
    fn root(&self) -> Result<Box<dyn Collection<'_> + '_>, SnapshotError> {
        Ok(Box::new(BoltBucket {
            snapshot: self,
            root: self.root,
            inline: None,
        }))
    }
}

fn select_meta(data: &[u8]) -> Result<Meta, SnapshotError> {
    let first = read_meta(data, 0);
    let page_size = first
        .as_ref()
        .map(|m| m.page_size)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let second = read_meta(data, page_size);

    match (first, second) {
        (Ok(a), Ok(b)) => Ok(if b.txid > a.txid { b } else { a }),
        (Ok(meta), Err(_)) | (Err(_), Ok(meta)) => Ok(meta),
        (Err(e), Err(_)) => Err(e),
    }
}

fn read_meta(data: &[u8], page_offset: usize) -> Result<Meta, SnapshotError> {
    let start = page_offset + PAGE_HEADER_SIZE;
    let meta = data
        .get(start..start + META_SIZE)
        .ok_or_else(|| SnapshotError::InvalidMeta("file too small".to_string()))?;
    let field = |at: usize| read_u64(meta, at).unwrap_or_default();

    let magic = read_u32(meta, 0).unwrap_or_default();
    if magic != MAGIC {
        return Err(SnapshotError::InvalidMeta(format!(
            "bad magic {magic:#010x}"
        )));
    }
    let version = read_u32(meta, 4).unwrap_or_default();
    if version != VERSION {
        return Err(SnapshotError::InvalidMeta(format!(
            "unsupported version {version}"
        )));
    }
    let checksum = field(META_CHECKSUM_OFFSET);
    if checksum != fnv1a64(&meta[..META_CHECKSUM_OFFSET]) {
        return Err(SnapshotError::InvalidMeta("checksum mismatch".to_string()));
    }
    let page_size = read_u32(meta, 8).unwrap_or_default() as usize;
    if page_size < MIN_PAGE_SIZE || !page_size.is_power_of_two() {
        return Err(SnapshotError::InvalidMeta(format!(
            "invalid page size {page_size}"
        )));
    }

    Ok(Meta {
        page_size,
        root: field(16),
        txid: field(48),
    })
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at.checked_add(2)?)?
        .try_into()
        .ok()
        .map(u16::from_le_bytes)
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at.checked_add(4)?)?
        .try_into()
        .ok()
        .map(u32::from_le_bytes)
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at.checked_add(8)?)?
        .try_into()
        .ok()
        .map(u64::from_le_bytes)
}

fn corrupt(pgid: u64, reason: &str) -> SnapshotError {
    SnapshotError::CorruptPage {
        pgid,
        reason: reason.to_string(),
    }
}

/// A branch or leaf page. Inline bucket pages carry pgid 0.
#[derive(Debug, Clone, Copy)]
struct Page<'a> {
    pgid: u64,
    data: &'a [u8],
    flags: u16,
    count: usize,
}

struct LeafElement<'a> {
    flags: u32,
    key: &'a [u8],
    value: &'a [u8],
}

impl LeafElement<'_> {
    fn is_bucket(&self) -> bool {
        self.flags & BUCKET_LEAF_FLAG != 0
    }
}

impl<'a> Page<'a> {
    fn parse(pgid: u64, data: &'a [u8]) -> Result<Self, SnapshotError> {
        let flags = read_u16(data, 8).ok_or_else(|| corrupt(pgid, "truncated page header"))?;
        let count =
            read_u16(data, 10).ok_or_else(|| corrupt(pgid, "truncated page header"))? as usize;
        if flags & (BRANCH_PAGE | LEAF_PAGE) == 0 {
            return Err(corrupt(pgid, &format!("unexpected page flags {flags:#06x}")));
        }
        if PAGE_HEADER_SIZE + count * ELEMENT_SIZE > data.len() {
            return Err(corrupt(pgid, "element table exceeds page"));
        }
        Ok(Self {
            pgid,
            data,
            flags,
            count,
        })
    }

    fn is_leaf(&self) -> bool {
        self.flags & LEAF_PAGE != 0
    }

    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8], SnapshotError> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| corrupt(self.pgid, "element data out of bounds"))
    }

    fn field(&self, at: usize) -> Result<usize, SnapshotError> {
        read_u32(self.data, at)
            .map(|v| v as usize)
            .ok_or_else(|| corrupt(self.pgid, "truncated element"))
    }

    fn element_offset(&self, index: usize) -> Result<usize, SnapshotError> {
        if index >= self.count {
            return Err(corrupt(self.pgid, "element index out of range"));
        }
        Ok(PAGE_HEADER_SIZE + index * ELEMENT_SIZE)
    }

    fn leaf(&self, index: usize) -> Result<LeafElement<'a>, SnapshotError> {
        let at = self.element_offset(index)?;
        let flags = self.field(at)? as u32;
        let key_start = at + self.field(at + 4)?;
        let ksize = self.field(at + 8)?;
        let vsize = self.field(at + 12)?;
        Ok(LeafElement {
            flags,
            key: self.slice(key_start, ksize)?,
            value: self.slice(key_start + ksize, vsize)?,
        })
    }

    fn branch(&self, index: usize) -> Result<(&'a [u8], u64), SnapshotError> {
        let at = self.element_offset(index)?;
        let key = self.slice(at + self.field(at)?, self.field(at + 4)?)?;
        let pgid = read_u64(self.data, at + 8).ok_or_else(|| corrupt(self.pgid, "truncated element"))?;
        Ok((key, pgid))
    }

    fn key(&self, index: usize) -> Result<&'a [u8], SnapshotError> {
        if self.is_leaf() {
            Ok(self.leaf(index)?.key)
        } else {
            Ok(self.branch(index)?.0)
        }
    }

    /// Index of the first element whose key is `>= key` (`count` if none).
    fn lower_bound(&self, key: &[u8]) -> Result<usize, SnapshotError> {
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key(mid)? < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

#[derive(Clone, Copy)]
struct BoltBucket<'a> {
    snapshot: &'a BoltSnapshot,
    root: u64,
    inline: Option<&'a [u8]>,
}

impl<'a> BoltBucket<'a> {
    fn from_value(snapshot: &'a BoltSnapshot, value: &'a [u8]) -> Result<Self, SnapshotError> {
        let root = read_u64(value, 0).ok_or_else(|| corrupt(0, "truncated bucket header"))?;
        let inline = if root == 0 {
            Some(
                value
                    .get(BUCKET_HEADER_SIZE..)
                    .ok_or_else(|| corrupt(0, "truncated inline bucket"))?,
            )
        } else {
            None
        };
        Ok(Self {
            snapshot,
            root,
            inline,
        })
    }

    fn root_page(&self) -> Result<Page<'a>, SnapshotError> {
        match self.inline {
            Some(data) => Page::parse(0, data),
            None => self.snapshot.page(self.root),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<LeafElement<'a>>, SnapshotError> {
        let mut page = self.root_page()?;
        loop {
            let index = page.lower_bound(key)?;
            if page.is_leaf() {
                if index < page.count {
                    let element = page.leaf(index)?;
                    if element.key == key {
                        return Ok(Some(element));
                    }
                }
                return Ok(None);
            }
            if page.count == 0 {
                return Ok(None);
            }
            let exact = index < page.count && page.key(index)? == key;
            let index = if exact { index } else { index.saturating_sub(1) };
            page = self.snapshot.page(page.branch(index)?.1)?;
        }
    }
}

impl<'a> Collection<'a> for BoltBucket<'a> {
    fn cursor(&self) -> Box<dyn Cursor<'a> + 'a> {
        Box::new(BoltCursor {
            bucket: *self,
            stack: Vec::new(),
            started: false,
        })
    }

    fn collection(&self, key: &[u8]) -> Result<Option<Box<dyn Collection<'a> + 'a>>, SnapshotError> {
        match self.get(key)? {
            Some(element) if element.is_bucket() => Ok(Some(Box::new(BoltBucket::from_value(
                self.snapshot,
                element.value,
            )?))),
            _ => Ok(None),
        }
    }
}

struct Frame<'a> {
    page: Page<'a>,
    index: usize,
}

/// Depth-first cursor: one frame per level, leaf frame on top.
struct BoltCursor<'a> {
    bucket: BoltBucket<'a>,
    stack: Vec<Frame<'a>>,
    started: bool,
}

impl<'a> BoltCursor<'a> {
    /// Push frames down to the leaf under the top frame's current index.
    fn descend(&mut self) -> Result<(), SnapshotError> {
        while let Some(top) = self.stack.last() {
            if top.page.is_leaf() {
                break;
            }
            let (_, pgid) = top.page.branch(top.index)?;
            let page = self.bucket.snapshot.page(pgid)?;
            self.stack.push(Frame { page, index: 0 });
        }
        Ok(())
    }

    fn on_empty_leaf(&self) -> bool {
        self.stack.last().is_some_and(|f| f.page.count == 0)
    }

    fn current(&self) -> Result<Option<Entry<'a>>, SnapshotError> {
        let Some(top) = self.stack.last() else {
            return Ok(None);
        };
        if top.index >= top.page.count {
            return Ok(None);
        }
        let element = top.page.leaf(top.index)?;
        Ok(Some(Entry {
            key: element.key,
            value: (!element.is_bucket()).then_some(element.value),
        }))
    }

    fn advance(&mut self) -> Result<Option<Entry<'a>>, SnapshotError> {
        loop {
            loop {
                let Some(top) = self.stack.last_mut() else {
                    return Ok(None);
                };
                if top.index + 1 < top.page.count {
                    top.index += 1;
                    break;
                }
                self.stack.pop();
            }
            self.descend()?;
            if !self.on_empty_leaf() {
                return self.current();
            }
        }
    }
}

impl<'a> Cursor<'a> for BoltCursor<'a> {
    fn first(&mut self) -> Result<Option<Entry<'a>>, SnapshotError> {
        self.started = true;
        self.stack.clear();
        let page = self.bucket.root_page()?;
        self.stack.push(Frame { page, index: 0 });
        self.descend()?;
        if self.on_empty_leaf() {
            return self.advance();
        }
        self.current()
    }

    fn next(&mut self) -> Result<Option<Entry<'a>>, SnapshotError> {
        if !self.started {
            return self.first();
        }
        self.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PS: usize = 4096;

    fn header(buf: &mut [u8], id: u64, flags: u16, count: usize) {
        buf[0..8].copy_from_slice(&id.to_le_bytes());
        buf[8..10].copy_from_slice(&flags.to_le_bytes());
        buf[10..12].copy_from_slice(&(count as u16).to_le_bytes());
        buf[12..16].copy_from_slice(&0u32.to_le_bytes());
    }

    fn leaf(id: u64, items: &[(&str, Vec<u8>, bool)]) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_HEADER_SIZE + items.len() * ELEMENT_SIZE];
        header(&mut buf, id, LEAF_PAGE, items.len());
        for (i, (key, value, bucket)) in items.iter().enumerate() {
            let at = PAGE_HEADER_SIZE + i * ELEMENT_SIZE;
            let pos = (buf.len() - at) as u32;
            let flags = if *bucket { BUCKET_LEAF_FLAG } else { 0 };
            buf[at..at + 4].copy_from_slice(&flags.to_le_bytes());
            buf[at + 4..at + 8].copy_from_slice(&pos.to_le_bytes());
            buf[at + 8..at + 12].copy_from_slice(&(key.len() as u32).to_le_bytes());
            buf[at + 12..at + 16].copy_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(value);
        }
        buf
    }

    fn branch(id: u64, items: &[(&str, u64)]) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_HEADER_SIZE + items.len() * ELEMENT_SIZE];
        header(&mut buf, id, BRANCH_PAGE, items.len());
        for (i, (key, pgid)) in items.iter().enumerate() {
            let at = PAGE_HEADER_SIZE + i * ELEMENT_SIZE;
            let pos = (buf.len() - at) as u32;
            buf[at..at + 4].copy_from_slice(&pos.to_le_bytes());
            buf[at + 4..at + 8].copy_from_slice(&(key.len() as u32).to_le_bytes());
            buf[at + 8..at + 16].copy_from_slice(&pgid.to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
        }
        buf
    }

    fn bucket_ref(root: u64) -> Vec<u8> {
        let mut buf = root.to_le_bytes().to_vec();
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf
    }

    fn inline_bucket(items: &[(&str, Vec<u8>, bool)]) -> Vec<u8> {
        let mut buf = bucket_ref(0);
        buf.extend(leaf(0, items));
        buf
    }

    fn doc(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn meta(id: u64, root: u64, txid: u64) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_HEADER_SIZE + META_SIZE];
        header(&mut buf, id, META_PAGE, 0);
        let m = &mut buf[PAGE_HEADER_SIZE..];
        m[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        m[4..8].copy_from_slice(&VERSION.to_le_bytes());
        m[8..12].copy_from_slice(&(PS as u32).to_le_bytes());
        m[16..24].copy_from_slice(&root.to_le_bytes());
        m[32..40].copy_from_slice(&2u64.to_le_bytes());
        m[40..48].copy_from_slice(&10u64.to_le_bytes());
        m[48..56].copy_from_slice(&txid.to_le_bytes());
        let sum = fnv1a64(&m[..META_CHECKSUM_OFFSET]);
        m[56..64].copy_from_slice(&sum.to_le_bytes());
        buf
    }

    fn write_pages(pages: Vec<Vec<u8>>) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        for mut page in pages {
            assert!(page.len() <= PS);
            page.resize(PS, 0);
            file.write_all(&page).expect("Failed to write page");
        }
        file.flush().expect("Failed to flush");
        file
    }

    /// Root bucket at page 3:
    /// - "alpine 3.15" (page 4): "busybox" (inline), "openssl" (page 6)
    /// - "data-source" (inline, one document)
    /// - "empty" (inline, no entries)
    /// - "vulnerability" (branch page 5 over leaves 7 and 8)
    fn fixture_pages(meta0: Vec<u8>, meta1: Vec<u8>) -> Vec<Vec<u8>> {
        let mut freelist = vec![0u8; PAGE_HEADER_SIZE];
        header(&mut freelist, 2, 0x10, 0);
        vec![
            meta0,
            meta1,
            freelist,
            leaf(
                3,
                &[
                    ("alpine 3.15", bucket_ref(4), true),
                    (
                        "data-source",
                        inline_bucket(&[(
                            "alpine 3.15",
                            doc(r#"{"ID":"alpine","Name":"Alpine Secdb","URL":"https://secdb.alpinelinux.org/"}"#),
                            false,
                        )]),
                        true,
                    ),
                    ("empty", inline_bucket(&[]), true),
                    ("vulnerability", bucket_ref(5), true),
                ],
            ),
            leaf(
                4,
                &[
                    (
                        "busybox",
                        inline_bucket(&[("CVE-2022-0001", doc(r#"{"FixedVersion":"1.35"}"#), false)]),
                        true,
                    ),
                    ("openssl", bucket_ref(6), true),
                ],
            ),
            branch(5, &[("CVE-2023-0001", 7), ("CVE-2023-0003", 8)]),
            leaf(
                6,
                &[
                    ("CVE-2023-0001", doc(r#"{"FixedVersion":"3.0.8"}"#), false),
                    ("CVE-2023-0002", doc(r#"{"FixedVersion":"3.0.9"}"#), false),
                ],
            ),
            leaf(
                7,
                &[
                    ("CVE-2023-0001", doc(r#"{"Title":"one"}"#), false),
                    ("CVE-2023-0002", doc(r#"{"Title":"two"}"#), false),
                ],
            ),
            leaf(8, &[("CVE-2023-0003", doc(r#"{"Title":"three"}"#), false)]),
        ]
    }

    fn fixture() -> NamedTempFile {
        write_pages(fixture_pages(meta(0, 3, 2), meta(1, 3, 1)))
    }

    fn collect(collection: &dyn Collection<'_>) -> Vec<(String, Option<String>)> {
        let mut cursor = collection.cursor();
        let mut out = Vec::new();
        let mut entry = cursor.first().expect("first");
        while let Some(e) = entry {
            out.push((
                String::from_utf8_lossy(e.key).into_owned(),
                e.value.map(|v| String::from_utf8_lossy(v).into_owned()),
            ));
            entry = cursor.next().expect("next");
        }
        out
    }

    #[test]
    fn test_open_uses_newest_meta() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).expect("open");
        assert_eq!(snapshot.txid(), 2);
        assert_eq!(snapshot.page_size, PS);
    }

    #[test]
    fn test_root_lists_buckets() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        let entries = collect(root.as_ref());
        let names: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["alpine 3.15", "data-source", "empty", "vulnerability"]);
        assert!(entries.iter().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn test_cursor_walks_branch_pages_in_order() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        let vulns = root.collection(b"vulnerability").unwrap().unwrap();
        assert_eq!(
            collect(vulns.as_ref()),
            vec![
                ("CVE-2023-0001".to_string(), Some(r#"{"Title":"one"}"#.to_string())),
                ("CVE-2023-0002".to_string(), Some(r#"{"Title":"two"}"#.to_string())),
                ("CVE-2023-0003".to_string(), Some(r#"{"Title":"three"}"#.to_string())),
            ]
        );
    }

    #[test]
    fn test_get_searches_through_branch_pages() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let bucket = BoltBucket {
            snapshot: &snapshot,
            root: 5,
            inline: None,
        };
        assert_eq!(bucket.get(b"CVE-2023-0002").unwrap().unwrap().value, br#"{"Title":"two"}"#);
        assert_eq!(bucket.get(b"CVE-2023-0003").unwrap().unwrap().value, br#"{"Title":"three"}"#);
        assert!(bucket.get(b"CVE-2023-0000").unwrap().is_none());
        assert!(bucket.get(b"CVE-2023-0004").unwrap().is_none());
    }

    #[test]
    fn test_nested_and_inline_buckets() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        let label = root.collection(b"alpine 3.15").unwrap().unwrap();
        assert_eq!(
            collect(label.as_ref()),
            vec![("busybox".to_string(), None), ("openssl".to_string(), None)]
        );

        let busybox = label.collection(b"busybox").unwrap().unwrap();
        assert_eq!(
            collect(busybox.as_ref()),
            vec![("CVE-2022-0001".to_string(), Some(r#"{"FixedVersion":"1.35"}"#.to_string()))]
        );

        let openssl = label.collection(b"openssl").unwrap().unwrap();
        assert_eq!(collect(openssl.as_ref()).len(), 2);
        assert!(openssl.collection(b"CVE-2023-0001").unwrap().is_none());
    }

    #[test]
    fn test_inline_document_bucket() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        let sources = root.collection(b"data-source").unwrap().unwrap();
        let entries = collect(sources.as_ref());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "alpine 3.15");
        assert!(entries[0].1.as_deref().unwrap().contains("Alpine Secdb"));
    }

    #[test]
    fn test_empty_bucket_yields_nothing() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        let empty = root.collection(b"empty").unwrap().unwrap();
        let mut cursor = empty.cursor();
        assert!(cursor.first().unwrap().is_none());
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn test_exhausted_cursor_stays_exhausted() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        let sources = root.collection(b"data-source").unwrap().unwrap();
        let mut cursor = sources.cursor();
        assert!(cursor.next().unwrap().is_some());
        assert!(cursor.next().unwrap().is_none());
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn test_missing_bucket() {
        let file = fixture();
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        let root = snapshot.root().unwrap();
        assert!(root.collection(b"debian 10").unwrap().is_none());
    }

    #[test]
    fn test_falls_back_to_second_meta_on_checksum_mismatch() {
        let mut meta0 = meta(0, 3, 9);
        meta0[PAGE_HEADER_SIZE + META_CHECKSUM_OFFSET] ^= 0xff;
        let file = write_pages(fixture_pages(meta0, meta(1, 3, 1)));
        let snapshot = BoltSnapshot::open(file.path()).unwrap();
        assert_eq!(snapshot.txid(), 1);
    }

    #[test]
    fn test_rejects_file_without_valid_meta() {
        let file = write_pages(vec![vec![0u8; PS], vec![0u8; PS]]);
        let err = BoltSnapshot::open(file.path()).err().expect("expected error");
        assert!(matches!(err, SnapshotError::InvalidMeta(_)));
    }

    #[test]
    fn test_fnv1a64_known_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
