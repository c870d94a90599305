//! Collaborator contracts: chunk loading and sample transforms.
//!
//! The iterator owns no I/O of its own. A [`ChunkLoader`] materializes one
//! chunk's raw records from its index-table slice, and a [`Transform`] turns
//! those records into trainable samples. Both run on the background prefetch
//! thread, so they must be shareable across threads.

use crate::error::Result;
use crate::index::IndexTable;
use std::sync::Arc;

/// Materializes one chunk's raw records from an index-table slice.
pub trait ChunkLoader: Send + Sync + 'static {
    /// Opaque raw chunk, consumed only by the transform function.
    type Raw: Send + 'static;

    /// Load the records named by `chunk`.
    fn load(&self, chunk: &IndexTable) -> Result<Self::Raw>;
}

impl<F, R> ChunkLoader for F
where
    F: Fn(&IndexTable) -> Result<R> + Send + Sync + 'static,
    R: Send + 'static,
{
    type Raw = R;

    fn load(&self, chunk: &IndexTable) -> Result<R> {
        self(chunk)
    }
}

/// Read-only snapshot of iterator state handed to the transform.
///
/// Taken at the moment the chunk load is scheduled, so a transform can make
/// epoch-dependent decisions (curriculum sorting, augmentation schedules)
/// without touching the live iterator.
#[derive(Clone, Copy, Debug)]
pub struct BatchContext {
    /// Samples per returned batch
    pub batch_size: usize,
    /// Completed-epoch counter at scheduling time
    pub epoch: usize,
    /// Which partition of the dataset bag is being loaded
    pub chunk_index: usize,
}

/// Per-chunk transform from raw records to trainable samples.
///
/// Called once per chunk load, on the background task. Returning an empty
/// sample list is a contract violation and fails the load.
pub type Transform<R, S, X> =
    Arc<dyn Fn(&BatchContext, R, Option<&X>) -> Result<Vec<S>> + Send + Sync>;
