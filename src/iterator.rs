//! Chunked batch iteration with single-slot background prefetch.
//!
//! A [`BatchIterator`] streams a large indexed corpus in bounded-memory
//! chunks. Two datasets are live at once: the current one, consumed in
//! fixed-size batches, and the next one, loading in the background. The
//! consumer blocks only at a chunk boundary, when it joins the in-flight
//! load, so the worst-case stall is one chunk load amortized across one
//! chunk's worth of batches.

use crate::config::IterConfig;
use crate::error::{Error, LoadError, Result};
use crate::index::IndexTable;
use crate::loader::{BatchContext, ChunkLoader, Transform};
use crate::prefetch::PrefetchSlot;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Mutable cursor over the current dataset and epoch accounting.
///
/// All position state lives here so the transition logic in
/// [`BatchIterator::next_batch`] is auditable in one place.
#[derive(Clone, Copy, Debug)]
struct Cursor {
    /// Index of the next unread sample in the current dataset
    position: usize,
    /// Progress within the logical epoch, modulo `epoch_size`
    epoch_position: usize,
    /// Which partition the prefetch slot is loading (cyclic)
    chunk_index: usize,
    /// Completed-epoch counter
    epoch: usize,
    /// Nominal samples per epoch; grows during the first pass, frozen after
    epoch_size: usize,
    /// True while `epoch_size` is still accumulating chunk lengths
    counting: bool,
    /// Edge-triggered: true only for the call that crossed an epoch boundary
    new_epoch: bool,
    /// Edge-triggered: true only for the call that crossed a chunk boundary
    new_chunk: bool,
}

impl Cursor {
    fn start() -> Self {
        Self {
            position: 0,
            epoch_position: 0,
            chunk_index: 0,
            epoch: 0,
            epoch_size: 0,
            counting: true,
            new_epoch: false,
            new_chunk: false,
        }
    }
}

/// Overrides for a held-out iterator built by [`BatchIterator::retained`].
///
/// Fields left at their defaults fall back to the parent's transform, batch
/// size and extra arguments; chunking defaults to automatic and shuffling
/// to off, as for a fresh construction.
pub struct RetainedOptions<R, S, X> {
    pub transform: Option<Transform<R, S, X>>,
    pub batch_size: Option<usize>,
    pub chunks: crate::config::ChunkSpec,
    pub shuffle: bool,
    pub extra: Option<Arc<X>>,
}

impl<R, S, X> Default for RetainedOptions<R, S, X> {
    fn default() -> Self {
        Self {
            transform: None,
            batch_size: None,
            chunks: crate::config::ChunkSpec::Auto,
            shuffle: false,
            extra: None,
        }
    }
}

/// Chunked, prefetching batch iterator over an indexed corpus.
///
/// Single-consumer: `next_batch` must not be called concurrently from
/// multiple threads, and the type is deliberately not `Sync`.
pub struct BatchIterator<L, S, X = ()>
where
    L: ChunkLoader,
{
    loader: Arc<L>,
    transform: Transform<L::Raw, S, X>,
    extra: Option<Arc<X>>,
    config: IterConfig,
    chunk_count: usize,
    train_table: IndexTable,
    retained_table: IndexTable,
    bag: Vec<IndexTable>,
    current: Vec<S>,
    slot: PrefetchSlot<Vec<S>>,
    cursor: Cursor,
    rng: StdRng,
}

impl<L, S, X> BatchIterator<L, S, X>
where
    L: ChunkLoader,
    S: Send + 'static,
    X: Send + Sync + 'static,
{
    /// Build an iterator over `table`.
    ///
    /// The table is shuffled once, split into training and retained
    /// portions, and partitioned into chunks. Chunk 0 loads synchronously
    /// to establish the first dataset; with more than one chunk, a
    /// background load of chunk 1 starts immediately.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration, or when the first chunk load
    /// fails (including a transform that produces no samples).
    pub fn new(
        table: IndexTable,
        loader: L,
        transform: Transform<L::Raw, S, X>,
        config: IterConfig,
    ) -> Result<Self> {
        Self::with_extra(table, loader, transform, None, config)
    }

    /// Like [`BatchIterator::new`], with extra arguments forwarded to every
    /// transform call.
    pub fn with_extra(
        table: IndexTable,
        loader: L,
        transform: Transform<L::Raw, S, X>,
        extra: Option<Arc<X>>,
        config: IterConfig,
    ) -> Result<Self> {
        Self::from_parts(table, Arc::new(loader), transform, extra, config)
    }

    fn from_parts(
        table: IndexTable,
        loader: Arc<L>,
        transform: Transform<L::Raw, S, X>,
        extra: Option<Arc<X>>,
        config: IterConfig,
    ) -> Result<Self> {
        config.validate().map_err(Error::from)?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let total = table.len();
        let train_len = (total as f64 * (1.0 - config.retain)) as usize;
        let shuffled = table.shuffle(&mut rng);
        let train_table = shuffled.head(train_len);
        let retained_table = shuffled.tail(total - train_len);

        let bag = train_table.split(config.chunks.resolve(&train_table));
        let chunk_count = bag.len();

        tracing::debug!(
            train = train_table.len(),
            retained = retained_table.len(),
            chunks = chunk_count,
            "constructing batch iterator"
        );

        let mut it = Self {
            loader,
            transform,
            extra,
            config,
            chunk_count,
            train_table,
            retained_table,
            bag,
            current: Vec::new(),
            slot: PrefetchSlot::idle(),
            cursor: Cursor::start(),
            rng,
        };

        // Chunk 0 loads synchronously to establish the first dataset and
        // the nominal epoch size.
        it.current = it.load_chunk(0)?;
        it.cursor.epoch_size = it.current.len();

        if it.chunk_count > 1 {
            it.cursor.chunk_index = 1;
            it.start_prefetch(1, it.cursor.epoch);
        }

        Ok(it)
    }

    /// Samples per returned batch.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Number of chunk partitions in the dataset bag.
    pub fn chunks(&self) -> usize {
        self.chunk_count
    }

    /// Index of the chunk currently being consumed.
    pub fn current_chunk(&self) -> usize {
        if self.cursor.chunk_index == 0 {
            self.chunk_count - 1
        } else {
            self.cursor.chunk_index - 1
        }
    }

    /// Completed-epoch counter.
    pub fn epoch(&self) -> usize {
        self.cursor.epoch
    }

    /// True only for the single call that crossed an epoch boundary.
    pub fn is_new_epoch(&self) -> bool {
        self.cursor.new_epoch
    }

    /// True only for the single call that crossed a chunk boundary.
    pub fn is_new_chunk(&self) -> bool {
        self.cursor.new_chunk
    }

    /// Nominal samples per epoch. Grows while the first pass over the
    /// chunks is still counting, constant afterwards.
    pub fn epoch_size(&self) -> usize {
        self.cursor.epoch_size
    }

    /// Progress within the logical epoch, in `[0.0, 1.0]`.
    pub fn epoch_progress(&self) -> f64 {
        if self.cursor.new_epoch {
            1.0
        } else {
            self.cursor.epoch_position as f64 / self.cursor.epoch_size as f64
        }
    }

    /// Progress within the current dataset, in `[0.0, 1.0]`.
    pub fn chunk_progress(&self) -> f64 {
        if self.cursor.new_chunk {
            1.0
        } else {
            self.cursor.position as f64 / self.current.len() as f64
        }
    }

    /// Training portion of the (shuffled) index table.
    pub fn train_table(&self) -> &IndexTable {
        &self.train_table
    }

    /// Held-out portion of the (shuffled) index table.
    pub fn retained_table(&self) -> &IndexTable {
        &self.retained_table
    }

    /// Return the next batch, always exactly `batch_size` samples.
    ///
    /// At a chunk boundary this joins the in-flight load and wraps the
    /// batch with the newly arrived dataset's head elements; a batch larger
    /// than one chunk keeps wrapping across boundaries until it is full.
    /// Cursor state is only advanced once the batch is fully assembled, so
    /// a failed load leaves the iterator where it was.
    pub fn next_batch(&mut self) -> Result<Vec<S>>
    where
        S: Clone,
    {
        let batch_size = self.config.batch_size;
        let start = self.cursor.position;

        let mut batch = Vec::with_capacity(batch_size);
        let end = (start + batch_size).min(self.current.len());
        batch.extend_from_slice(&self.current[start..end]);

        if start + batch_size < self.current.len() {
            // Entirely inside the current dataset.
            self.cursor.position = start + batch_size;
            self.cursor.new_epoch = false;
            self.cursor.new_chunk = false;
        } else {
            // Chunk boundary: wrap with the next dataset's head, crossing
            // as many boundaries as the batch needs. Crossings are staged
            // on a cursor copy and committed only once the batch is
            // complete, so a failed load leaves the counters untouched.
            let mut staged = self.cursor;
            let mut crossed_epoch = false;
            loop {
                crossed_epoch |= self.advance_dataset(&mut staged)?;

                let need = batch_size - batch.len();
                let take = need.min(self.current.len());
                batch.extend_from_slice(&self.current[..take]);
                staged.position = take;

                if batch.len() == batch_size {
                    break;
                }
            }
            staged.new_chunk = true;
            staged.new_epoch = crossed_epoch;
            self.cursor = staged;
        }

        self.cursor.epoch_position =
            (self.cursor.epoch_position + batch_size) % self.cursor.epoch_size;

        Ok(batch)
    }

    /// Cross one chunk boundary: obtain the incoming dataset, promote it to
    /// current, and update the chunk/epoch accounting on the staged cursor.
    /// Returns whether the crossing was also an epoch boundary.
    fn advance_dataset(&mut self, cursor: &mut Cursor) -> Result<bool> {
        if self.chunk_count == 1 {
            if self.config.shuffle {
                self.current.shuffle(&mut self.rng);
            }
            cursor.epoch += 1;
            return Ok(true);
        }

        let mut incoming = self.slot.join()?;
        if self.config.shuffle {
            incoming.shuffle(&mut self.rng);
        }
        self.current = incoming;

        if cursor.counting {
            cursor.epoch_size += self.current.len();
        }

        cursor.chunk_index = (cursor.chunk_index + 1) % self.chunk_count;

        let mut crossed_epoch = false;
        if cursor.chunk_index == 1 {
            cursor.epoch += 1;
            crossed_epoch = true;
        }

        if cursor.chunk_index == 0 {
            // First full pass complete: freeze the epoch size and deal a
            // fresh shuffle of the training table for the next pass. The
            // bag is only touched here, strictly after the join, so there
            // is no race with an in-flight load.
            cursor.counting = false;
            self.train_table = self.train_table.shuffle(&mut self.rng);
            self.bag = self.train_table.split(self.chunk_count);
        }

        self.start_prefetch(cursor.chunk_index, cursor.epoch);

        Ok(crossed_epoch)
    }

    /// Build a fresh iterator over the held-out portion of the table.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoRetainedData`] when the parent was constructed
    /// with a zero retain fraction.
    pub fn retained(&self, opts: RetainedOptions<L::Raw, S, X>) -> Result<BatchIterator<L, S, X>> {
        if self.retained_table.is_empty() {
            return Err(Error::NoRetainedData);
        }

        let config = IterConfig {
            batch_size: opts.batch_size.unwrap_or(self.config.batch_size),
            chunks: opts.chunks,
            shuffle: opts.shuffle,
            retain: 0.0,
            seed: self.config.seed,
        };
        let transform = opts
            .transform
            .unwrap_or_else(|| Arc::clone(&self.transform));
        let extra = opts.extra.or_else(|| self.extra.clone());

        BatchIterator::from_parts(
            self.retained_table.clone(),
            Arc::clone(&self.loader),
            transform,
            extra,
            config,
        )
    }

    fn context(&self, chunk_index: usize, epoch: usize) -> BatchContext {
        BatchContext {
            batch_size: self.config.batch_size,
            epoch,
            chunk_index,
        }
    }

    fn load_chunk(&self, index: usize) -> Result<Vec<S>> {
        load_one(
            self.context(index, self.cursor.epoch),
            &*self.loader,
            &self.transform,
            self.extra.as_deref(),
            &self.bag[index],
        )
    }

    fn start_prefetch(&mut self, index: usize, epoch: usize) {
        let ctx = self.context(index, epoch);
        let loader = Arc::clone(&self.loader);
        let transform = Arc::clone(&self.transform);
        let extra = self.extra.clone();
        let chunk = self.bag[index].clone();

        self.slot = PrefetchSlot::spawn(move || {
            load_one(ctx, &*loader, &transform, extra.as_deref(), &chunk)
        });
    }
}

impl<L, S, X> Iterator for BatchIterator<L, S, X>
where
    L: ChunkLoader,
    S: Clone + Send + 'static,
    X: Send + Sync + 'static,
{
    type Item = Result<Vec<S>>;

    /// Endless stream of batches; pair with `take` for a bounded run.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Load and transform one chunk. Runs on the caller's thread for chunk 0
/// and on the prefetch thread for everything after.
fn load_one<L, S, X>(
    ctx: BatchContext,
    loader: &L,
    transform: &Transform<L::Raw, S, X>,
    extra: Option<&X>,
    chunk: &IndexTable,
) -> Result<Vec<S>>
where
    L: ChunkLoader,
{
    tracing::debug!(chunk = ctx.chunk_index, entries = chunk.len(), "loading chunk");

    let raw = loader.load(chunk)?;
    let samples = transform(&ctx, raw, extra)?;

    if samples.is_empty() {
        return Err(LoadError::EmptyTransformOutput {
            chunk: ctx.chunk_index,
        }
        .into());
    }

    if ctx.batch_size > samples.len() {
        tracing::warn!(
            batch_size = ctx.batch_size,
            samples = samples.len(),
            chunk = ctx.chunk_index,
            "batch size exceeds chunk sample count; batches will wrap into the next chunk"
        );
    }

    Ok(samples)
}
