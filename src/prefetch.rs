//! Single-slot background prefetch.
//!
//! A [`PrefetchSlot`] is the one-element producer/consumer handoff between a
//! chunk load running on a worker thread and the consumer of the iterator:
//! at most one load is in flight, and the consumer blocks only when it joins
//! the slot at a chunk boundary. There is no cancellation and no timeout; a
//! started load always runs to completion.

use crate::error::{Error, LoadError, Result};
use std::thread::{self, JoinHandle};

/// Single-slot future for the one in-flight chunk load.
pub struct PrefetchSlot<T> {
    handle: Option<JoinHandle<Result<T>>>,
}

impl<T: Send + 'static> PrefetchSlot<T> {
    /// Empty slot with no pending load.
    pub fn idle() -> Self {
        Self { handle: None }
    }

    /// Start a background load, filling the slot.
    pub fn spawn<F>(task: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self {
            handle: Some(thread::spawn(task)),
        }
    }

    /// True while a load is in flight.
    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Block until the pending load finishes and take its result.
    ///
    /// A load failure re-raises here, synchronously on the caller's thread.
    /// A worker panic is reported as [`LoadError::WorkerPanicked`].
    pub fn join(&mut self) -> Result<T> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::from(LoadError::WorkerPanicked))?,
            None => Err(LoadError::NoPendingLoad.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_returns_the_loaded_value() {
        let mut slot = PrefetchSlot::spawn(|| Ok(vec![1, 2, 3]));

        assert!(slot.is_pending());
        assert_eq!(slot.join().unwrap(), vec![1, 2, 3]);
        assert!(!slot.is_pending());
    }

    #[test]
    fn join_reraises_the_load_error() {
        let mut slot: PrefetchSlot<Vec<u8>> =
            PrefetchSlot::spawn(|| Err(LoadError::EmptyTransformOutput { chunk: 3 }.into()));

        match slot.join() {
            Err(Error::Load(LoadError::EmptyTransformOutput { chunk: 3 })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn worker_panic_surfaces_as_an_error() {
        let mut slot: PrefetchSlot<()> = PrefetchSlot::spawn(|| panic!("load blew up"));

        match slot.join() {
            Err(Error::Load(LoadError::WorkerPanicked)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn joining_an_idle_slot_is_an_error() {
        let mut slot: PrefetchSlot<()> = PrefetchSlot::idle();

        match slot.join() {
            Err(Error::Load(LoadError::NoPendingLoad)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
