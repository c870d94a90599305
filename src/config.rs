//! Iterator configuration and automatic chunk-count sizing.

use crate::error::ConfigError;
use crate::index::IndexTable;

/// Target bytes per chunk for automatic sizing (100 MiB).
pub const AUTO_CHUNK_TARGET_BYTES: u64 = 100 * 1024 * 1024;

/// Entries sampled from the head of the training table to estimate the mean
/// sample size.
const AUTO_SIZE_SAMPLE: usize = 10;

/// Chunk-count selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkSpec {
    /// Derive the chunk count from sampled data sizes so each chunk
    /// approximates [`AUTO_CHUNK_TARGET_BYTES`].
    Auto,
    /// Explicit positive chunk count.
    Fixed(usize),
}

impl ChunkSpec {
    /// Resolve to a concrete chunk count for the given training table.
    ///
    /// `Auto` averages the size estimates of the first [`AUTO_SIZE_SAMPLE`]
    /// entries and targets [`AUTO_CHUNK_TARGET_BYTES`] per chunk; the result
    /// is always at least 1.
    pub fn resolve(self, train: &IndexTable) -> usize {
        match self {
            ChunkSpec::Fixed(n) => n,
            ChunkSpec::Auto => {
                let sample = train.head(AUTO_SIZE_SAMPLE);
                if sample.is_empty() {
                    return 1;
                }
                let mean = sample.total_data_size() as f64 / sample.len() as f64;
                if mean <= 0.0 {
                    return 1;
                }
                let per_chunk = (AUTO_CHUNK_TARGET_BYTES as f64 / mean).ceil() as usize;
                (train.len() / per_chunk.max(1)).max(1)
            }
        }
    }
}

/// Batch iterator configuration.
#[derive(Clone, Copy, Debug)]
pub struct IterConfig {
    /// Samples per returned batch
    pub batch_size: usize,
    /// Chunk partitioning of the training table
    pub chunks: ChunkSpec,
    /// Shuffle each dataset in memory before consumption wraps into it
    pub shuffle: bool,
    /// Fraction of the table held out for evaluation, in `[0.0, 0.9]`
    pub retain: f64,
    /// Seed for deterministic shuffling; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for IterConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            chunks: ChunkSpec::Auto,
            shuffle: false,
            retain: 0.0,
            seed: None,
        }
    }
}

impl IterConfig {
    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.chunks == ChunkSpec::Fixed(0) {
            return Err(ConfigError::InvalidChunkCount);
        }
        if !(0.0..=0.9).contains(&self.retain) {
            return Err(ConfigError::InvalidRetainFraction(self.retain));
        }
        Ok(())
    }
}
