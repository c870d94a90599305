//! uttfeed: chunked dataset iteration for acoustic-model training.
//!
//! Large speech corpora do not fit in memory, so training consumes them in
//! bounded chunks: while the current chunk is eaten in fixed-size batches, a
//! background task loads and transforms the next one. This crate provides
//! that iterator, the index-table bookkeeping behind it, and the companion
//! utilities (progress reporting, batch padding) used around a training
//! loop.
//!
//! # Architecture
//!
//! - [`index::IndexTable`]: ordered sample keys with byte-size estimates;
//!   shuffle/head/tail/split all return new tables
//! - [`loader::ChunkLoader`] and [`loader::Transform`]: user-supplied I/O
//!   and sample construction, run on the prefetch thread
//! - [`prefetch::PrefetchSlot`]: the single-slot handoff between the one
//!   in-flight load and the consumer
//! - [`iterator::BatchIterator`]: the chunk-cycling batch iterator itself
//! - [`progress::Reporter`] and [`pad::pad_sequence`]: training-loop
//!   bookkeeping and batch assembly helpers
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use uttfeed::config::{ChunkSpec, IterConfig};
//! use uttfeed::index::{IndexEntry, IndexTable};
//! use uttfeed::iterator::BatchIterator;
//! use uttfeed::loader::Transform;
//!
//! # fn main() -> uttfeed::error::Result<()> {
//! let table: IndexTable = (0..100)
//!     .map(|i| IndexEntry::new(format!("utt-{i:03}"), 400))
//!     .collect();
//!
//! // The loader materializes a chunk's records; the transform turns them
//! // into trainable samples.
//! let loader = |chunk: &IndexTable| -> uttfeed::error::Result<Vec<String>> {
//!     Ok(chunk.keys().map(str::to_owned).collect())
//! };
//! let transform: Transform<Vec<String>, String, ()> =
//!     Arc::new(|_ctx, raw, _extra| Ok(raw));
//!
//! let config = IterConfig {
//!     batch_size: 16,
//!     chunks: ChunkSpec::Fixed(4),
//!     ..IterConfig::default()
//! };
//! let mut batches = BatchIterator::new(table, loader, transform, config)?;
//!
//! let batch = batches.next_batch()?;
//! assert_eq!(batch.len(), 16);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod iterator;
pub mod loader;
pub mod math;
pub mod pad;
pub mod prefetch;
pub mod progress;
