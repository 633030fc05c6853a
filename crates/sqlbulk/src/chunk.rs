//! Statement chunking.

use sqlbulk_core::{Error, Result};
use std::num::NonZeroUsize;

/// Rows per statement unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 999;

/// Maximum number of rows written by a single statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize(NonZeroUsize);

impl ChunkSize {
    /// Fails for zero.
    #[allow(clippy::result_large_err)]
    pub fn new(rows: usize) -> Result<Self> {
        NonZeroUsize::new(rows)
            .map(Self)
            .ok_or_else(|| Error::config("chunk size must be at least 1"))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Number of statements needed for `rows` rows.
    pub fn chunk_count(self, rows: usize) -> usize {
        rows.div_ceil(self.get())
    }

    /// Split `items` into consecutive chunks of at most this size.
    pub fn split<T>(self, items: &[T]) -> std::slice::Chunks<'_, T> {
        items.chunks(self.get())
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(NonZeroUsize::MIN.saturating_add(DEFAULT_CHUNK_SIZE - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_999() {
        assert_eq!(ChunkSize::default().get(), 999);
    }

    #[test]
    fn zero_is_rejected() {
        assert!(ChunkSize::new(0).is_err());
        assert_eq!(ChunkSize::new(1).unwrap().get(), 1);
    }

    #[test]
    fn split_sizes() {
        let rows: Vec<u32> = (0..2500).collect();
        let size = ChunkSize::default();
        let sizes: Vec<usize> = size.split(&rows).map(<[u32]>::len).collect();
        assert_eq!(sizes, vec![999, 999, 502]);
        assert_eq!(size.chunk_count(rows.len()), 3);
        assert_eq!(size.chunk_count(0), 0);
        assert_eq!(size.chunk_count(999), 1);
    }
}
