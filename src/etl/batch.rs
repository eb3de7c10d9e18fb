//! Fixed-size row batching

use super::MAX_BATCH_SIZE;

/// Accumulates rows and hands them out in batches of at most `size` rows.
///
/// A batch is only ever returned non-empty, so N rows always produce
/// exactly ceil(N / size) batches.
#[derive(Debug)]
pub struct Batcher<T> {
    size: usize,
    rows: Vec<T>,
}

impl<T> Batcher<T> {
    /// `size` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, MAX_BATCH_SIZE);
        Self {
            size,
            rows: Vec::with_capacity(size),
        }
    }

    /// Add a row, returning a full batch once `size` rows are buffered.
    pub fn push(&mut self, row: T) -> Option<Vec<T>> {
        self.rows.push(row);
        if self.rows.len() >= self.size {
            Some(std::mem::replace(
                &mut self.rows,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    /// Take whatever is still buffered.
    pub fn finish(&mut self) -> Option<Vec<T>> {
        if self.rows.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_sizes(rows: usize, size: usize) -> Vec<usize> {
        let mut batcher = Batcher::new(size);
        let mut sizes = Vec::new();
        for row in 0..rows {
            if let Some(batch) = batcher.push(row) {
                sizes.push(batch.len());
            }
        }
        if let Some(batch) = batcher.finish() {
            sizes.push(batch.len());
        }
        sizes
    }

    #[test]
    fn test_batcher_splits_evenly() {
        assert_eq!(batch_sizes(10_000, 5000), vec![5000, 5000]);
    }

    #[test]
    fn test_batcher_remainder() {
        assert_eq!(batch_sizes(12_001, 5000), vec![5000, 5000, 2001]);
        assert_eq!(batch_sizes(1, 5000), vec![1]);
    }

    #[test]
    fn test_batcher_empty() {
        assert!(batch_sizes(0, 5000).is_empty());
    }

    #[test]
    fn test_batcher_keeps_order() {
        let mut batcher = Batcher::new(2);
        assert_eq!(batcher.push("a"), None);
        assert_eq!(batcher.push("b"), Some(vec!["a", "b"]));
        assert_eq!(batcher.push("c"), None);
        assert_eq!(batcher.finish(), Some(vec!["c"]));
        assert_eq!(batcher.finish(), None);
    }

    #[test]
    fn test_batcher_zero_size() {
        assert_eq!(batch_sizes(3, 0), vec![1, 1, 1]);
    }

    #[test]
    fn test_batcher_caps_oversized_batches() {
        assert_eq!(
            batch_sizes(MAX_BATCH_SIZE + 1, 20_000),
            vec![MAX_BATCH_SIZE, 1]
        );
    }
}
