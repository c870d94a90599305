//! Integration tests for chunked batch iteration.

use eyre::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uttfeed::config::{ChunkSpec, IterConfig};
use uttfeed::index::{IndexEntry, IndexTable};
use uttfeed::iterator::BatchIterator;
use uttfeed::loader::Transform;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn table(n: usize) -> IndexTable {
    (0..n)
        .map(|i| IndexEntry::new(format!("utt-{i:04}"), 2000))
        .collect()
}

fn key_loader(chunk: &IndexTable) -> uttfeed::error::Result<Vec<String>> {
    Ok(chunk.keys().map(str::to_owned).collect())
}

fn identity() -> Transform<Vec<String>, String, ()> {
    Arc::new(|_ctx, raw, _extra| Ok(raw))
}

#[test]
fn batches_are_always_full() -> Result<()> {
    init_tracing();

    // Chunk lengths (34, 33, 33) never divide the batch size evenly.
    let config = IterConfig {
        batch_size: 7,
        chunks: ChunkSpec::Fixed(3),
        seed: Some(1),
        ..IterConfig::default()
    };
    let mut it = BatchIterator::new(table(100), key_loader, identity(), config)?;

    for _ in 0..60 {
        assert_eq!(it.next_batch()?.len(), 7);
    }
    Ok(())
}

#[test]
fn one_epoch_covers_the_training_partition() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 10,
        chunks: ChunkSpec::Fixed(3),
        seed: Some(5),
        ..IterConfig::default()
    };
    let mut it = BatchIterator::new(table(90), key_loader, identity(), config)?;

    let mut seen = Vec::new();
    loop {
        seen.extend(it.next_batch()?);
        if it.is_new_epoch() {
            break;
        }
    }

    // Everything before the boundary belongs to the first pass.
    seen.truncate(it.epoch_size());
    seen.sort_unstable();

    let mut expected: Vec<String> = table(90).keys().map(str::to_owned).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
    Ok(())
}

#[test]
fn boundary_flags_fire_once_per_boundary() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 5,
        chunks: ChunkSpec::Fixed(4),
        seed: Some(9),
        ..IterConfig::default()
    };
    let mut it = BatchIterator::new(table(80), key_loader, identity(), config)?;

    // Two full epochs: 80 samples each, 5 per batch.
    let mut epoch_flags = 0;
    let mut chunk_flags = 0;
    for _ in 0..32 {
        it.next_batch()?;
        if it.is_new_epoch() {
            epoch_flags += 1;
        }
        if it.is_new_chunk() {
            chunk_flags += 1;
        }
    }

    assert_eq!(epoch_flags, 2);
    // Four chunk crossings per epoch, the epoch crossing included.
    assert_eq!(chunk_flags, 8);
    assert_eq!(it.epoch(), 2);
    Ok(())
}

#[test]
fn epoch_size_grows_then_freezes() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 10,
        chunks: ChunkSpec::Fixed(4),
        seed: Some(2),
        ..IterConfig::default()
    };
    let mut it = BatchIterator::new(table(100), key_loader, identity(), config)?;

    let mut previous = it.epoch_size();
    let mut frozen_at = None;
    for call in 0..40 {
        it.next_batch()?;

        let size = it.epoch_size();
        assert!(size >= previous, "epoch size shrank at call {call}");
        previous = size;

        if size == 100 && frozen_at.is_none() {
            frozen_at = Some(call);
        }
    }

    assert_eq!(previous, 100);
    // First pass ends within the first epoch's worth of calls.
    assert!(frozen_at.is_some_and(|call| call < 10));
    Ok(())
}

#[test]
fn progress_wraps_with_the_single_chunk_epoch() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 5,
        chunks: ChunkSpec::Fixed(1),
        seed: Some(4),
        ..IterConfig::default()
    };
    let mut it = BatchIterator::new(table(20), key_loader, identity(), config)?;
    assert_eq!(it.epoch_progress(), 0.0);
    assert_eq!(it.chunk_progress(), 0.0);

    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 0.25);
    assert_eq!(it.chunk_progress(), 0.25);
    it.next_batch()?;
    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 0.75);

    // The wrapping call reports full progress, then the counters restart.
    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 1.0);
    assert_eq!(it.chunk_progress(), 1.0);

    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 0.25);
    assert_eq!(it.chunk_progress(), 0.25);
    Ok(())
}

#[test]
fn progress_tracks_the_epoch_across_chunk_boundaries() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 5,
        chunks: ChunkSpec::Fixed(2),
        seed: Some(8),
        ..IterConfig::default()
    };
    let mut it = BatchIterator::new(table(20), key_loader, identity(), config)?;

    // 5 of the provisional 10-sample epoch.
    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 0.5);
    assert_eq!(it.chunk_progress(), 0.5);

    // Crossing into the second chunk grows the epoch to its full 20
    // samples; the chunk is done but the epoch is only half way.
    it.next_batch()?;
    assert_eq!(it.epoch_size(), 20);
    assert_eq!(it.chunk_progress(), 1.0);
    assert_eq!(it.epoch_progress(), 0.5);

    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 0.75);

    // The epoch boundary call reports full progress and wraps to zero.
    it.next_batch()?;
    assert!(it.is_new_epoch());
    assert_eq!(it.epoch_progress(), 1.0);

    it.next_batch()?;
    assert_eq!(it.epoch_progress(), 0.25);
    assert_eq!(it.chunk_progress(), 0.5);
    Ok(())
}

#[test]
fn retained_partition_is_disjoint_from_training() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 8,
        chunks: ChunkSpec::Fixed(2),
        retain: 0.2,
        seed: Some(13),
        ..IterConfig::default()
    };
    let it = BatchIterator::new(table(100), key_loader, identity(), config)?;

    assert_eq!(it.train_table().len(), 80);
    assert_eq!(it.retained_table().len(), 20);

    let train: std::collections::HashSet<_> = it.train_table().keys().collect();
    assert!(it.retained_table().keys().all(|k| !train.contains(k)));
    Ok(())
}

#[test]
fn iterator_adapter_streams_batches() -> Result<()> {
    init_tracing();

    let config = IterConfig {
        batch_size: 4,
        chunks: ChunkSpec::Fixed(1),
        seed: Some(3),
        ..IterConfig::default()
    };
    let it = BatchIterator::new(table(12), key_loader, identity(), config)?;

    let batches: Vec<_> = it.take(5).collect::<uttfeed::error::Result<_>>()?;
    assert!(batches.iter().all(|b| b.len() == 4));
    Ok(())
}
