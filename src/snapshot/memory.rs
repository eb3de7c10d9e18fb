//! In-memory snapshot

use std::collections::BTreeMap;
use std::collections::btree_map;

use super::{Collection, Cursor, Entry, Snapshot, SnapshotError};

#[derive(Debug, Clone)]
enum Node {
    Document(Vec<u8>),
    Collection(Tree),
}

type Tree = BTreeMap<Vec<u8>, Node>;

/// Ordered in-memory snapshot, keyed the same way as the bbolt file.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    root: Tree,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` inside the collection addressed by `path`,
    /// creating missing collections along the way. An empty path is not
    /// allowed because the root only holds collections.
    pub fn put(&mut self, path: &[&str], key: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        if let Some(tree) = self.tree_mut(path) {
            tree.insert(key.as_bytes().to_vec(), Node::Document(value.into()));
        }
        self
    }

    /// Create an (empty) collection at `path` if it does not exist yet.
    pub fn create_collection(&mut self, path: &[&str]) -> &mut Self {
        self.tree_mut(path);
        self
    }

    fn tree_mut(&mut self, path: &[&str]) -> Option<&mut Tree> {
        if path.is_empty() {
            return None;
        }
        let mut tree = &mut self.root;
        for name in path {
            let node = tree
                .entry(name.as_bytes().to_vec())
                .or_insert_with(|| Node::Collection(Tree::new()));
            if let Node::Document(_) = node {
                *node = Node::Collection(Tree::new());
            }
            tree = match node {
                Node::Collection(child) => child,
                Node::Document(_) => return None,
            };
        }
        Some(tree)
    }
}

impl Snapshot for MemorySnapshot {
    fn root(&self) -> Result<Box<dyn Collection<'_> + '_>, SnapshotError> {
        Ok(Box::new(MemoryCollection { tree: &self.root }))
    }
}

struct MemoryCollection<'a> {
    tree: &'a Tree,
}

impl<'a> Collection<'a> for MemoryCollection<'a> {
    fn cursor(&self) -> Box<dyn Cursor<'a> + 'a> {
        Box::new(MemoryCursor {
            tree: self.tree,
            iter: None,
        })
    }

    fn collection(&self, key: &[u8]) -> Result<Option<Box<dyn Collection<'a> + 'a>>, SnapshotError> {
        Ok(match self.tree.get(key) {
            Some(Node::Collection(tree)) => Some(Box::new(MemoryCollection { tree })),
            _ => None,
        })
    }
}

struct MemoryCursor<'a> {
    tree: &'a Tree,
    iter: Option<btree_map::Iter<'a, Vec<u8>, Node>>,
}

impl<'a> Cursor<'a> for MemoryCursor<'a> {
    fn first(&mut self) -> Result<Option<Entry<'a>>, SnapshotError> {
        self.iter = Some(self.tree.iter());
        self.next()
    }

    fn next(&mut self) -> Result<Option<Entry<'a>>, SnapshotError> {
        let tree = self.tree;
        let iter = self.iter.get_or_insert_with(|| tree.iter());
        Ok(iter.next().map(|(key, node)| Entry {
            key: key.as_slice(),
            value: match node {
                Node::Document(value) => Some(value.as_slice()),
                Node::Collection(_) => None,
            },
        }))
    }
}
