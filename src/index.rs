//! Ordered index tables over on-disk samples.
//!
//! An [`IndexTable`] is the bookkeeping view of a corpus: one entry per
//! sample, in a stable order, with a byte-size estimate used for automatic
//! chunk sizing. Tables are immutable once built; shuffle and subset
//! operations return new tables.

use crate::error::{IndexError, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// One sample's entry: lookup key plus a byte-size estimate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Sample key (utterance id)
    pub key: String,
    /// Estimated on-disk size in bytes
    pub data_size: u64,
}

impl IndexEntry {
    /// Create an entry from a key and its size estimate.
    pub fn new(key: impl Into<String>, data_size: u64) -> Self {
        Self {
            key: key.into(),
            data_size,
        }
    }
}

/// Ordered mapping from sample key to metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTable {
    entries: Vec<IndexEntry>,
}

impl IndexTable {
    /// Build a table from entries, keeping their order.
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Number of samples in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in table order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Iterate over entries in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, IndexEntry> {
        self.entries.iter()
    }

    /// Iterate over sample keys in table order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// New table with the same entries in randomized order.
    pub fn shuffle<R: Rng>(&self, rng: &mut R) -> IndexTable {
        let mut entries = self.entries.clone();
        entries.shuffle(rng);
        Self { entries }
    }

    /// New table holding the first `n` entries (clamped to the length).
    pub fn head(&self, n: usize) -> IndexTable {
        let n = n.min(self.len());
        Self {
            entries: self.entries[..n].to_vec(),
        }
    }

    /// New table holding the last `n` entries (clamped to the length).
    pub fn tail(&self, n: usize) -> IndexTable {
        let n = n.min(self.len());
        Self {
            entries: self.entries[self.len() - n..].to_vec(),
        }
    }

    /// Partition into `chunks` tables of near-equal length.
    ///
    /// The first `len % chunks` partitions carry one extra entry. The chunk
    /// count is clamped to `1..=len` so empty partitions are never produced
    /// (except for the single partition of an empty table).
    pub fn split(&self, chunks: usize) -> Vec<IndexTable> {
        let chunks = chunks.clamp(1, self.len().max(1));
        let base = self.len() / chunks;
        let extra = self.len() % chunks;

        let mut out = Vec::with_capacity(chunks);
        let mut start = 0;
        for i in 0..chunks {
            let take = base + usize::from(i < extra);
            out.push(Self {
                entries: self.entries[start..start + take].to_vec(),
            });
            start += take;
        }
        out
    }

    /// Sum of all entries' size estimates.
    pub fn total_data_size(&self) -> u64 {
        self.entries.iter().map(|e| e.data_size).sum()
    }

    /// Read a table from JSON.
    pub fn from_json_reader(reader: impl Read) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|e| IndexError::from(e).into())
    }

    /// Write the table as JSON.
    pub fn to_json_writer(&self, writer: impl Write) -> Result<()> {
        serde_json::to_writer(writer, self).map_err(|e| IndexError::from(e).into())
    }
}

impl FromIterator<IndexEntry> for IndexTable {
    fn from_iter<T: IntoIterator<Item = IndexEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a IndexTable {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table(n: usize) -> IndexTable {
        (0..n)
            .map(|i| IndexEntry::new(format!("utt-{i:03}"), 100 + i as u64))
            .collect()
    }

    #[test]
    fn head_and_tail_are_clamped() {
        let t = table(5);

        assert_eq!(t.head(3).len(), 3);
        assert_eq!(t.head(10).len(), 5);
        assert_eq!(t.tail(2).keys().collect::<Vec<_>>(), ["utt-003", "utt-004"]);
        assert_eq!(t.tail(10).len(), 5);
    }

    #[test]
    fn split_distributes_remainder_to_leading_chunks() {
        let t = table(10);

        let parts = t.split(3);
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts.iter().map(IndexTable::len).collect::<Vec<_>>(),
            [4, 3, 3]
        );

        // Order is preserved across the partition boundary.
        let rejoined: Vec<_> = parts.iter().flat_map(|p| p.keys()).collect();
        assert_eq!(rejoined, t.keys().collect::<Vec<_>>());
    }

    #[test]
    fn split_never_produces_empty_chunks() {
        let t = table(3);

        let parts = t.split(10);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn shuffle_preserves_the_multiset() {
        let t = table(50);
        let mut rng = StdRng::seed_from_u64(7);

        let shuffled = t.shuffle(&mut rng);
        assert_eq!(shuffled.len(), t.len());

        let mut before: Vec<_> = t.keys().collect();
        let mut after: Vec<_> = shuffled.keys().collect();
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after);
    }

    #[test]
    fn json_round_trip() {
        let t = table(4);

        let mut buf = Vec::new();
        t.to_json_writer(&mut buf).unwrap();
        let back = IndexTable::from_json_reader(buf.as_slice()).unwrap();

        assert_eq!(back, t);
    }
}
