//! Batch padding for variable-length sequence arrays.
//!
//! Training batches assembled from utterances of different lengths need a
//! rectangular layout before they reach the model. [`pad_sequence`] stacks a
//! list of equal-rank arrays along a new leading batch axis, padding one
//! chosen dimension to the longest (optionally truncated) sequence.

use crate::error::{PadError, Result};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use rand::Rng;

/// Where the padding goes relative to the sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PadPosition {
    /// Sequence first, padding after
    Tail,
    /// Padding first, sequence at the end
    Head,
    /// Sequence at a random offset, padding around it
    Random,
}

/// Which end of an over-long sequence is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Truncate {
    /// Drop leading frames, keep the last `max_length`
    Head,
    /// Drop trailing frames, keep the first `max_length`
    Tail,
}

/// Padding configuration.
#[derive(Clone, Debug)]
pub struct PadConfig<T> {
    /// Dimension to pad; all other dimensions must match across the batch
    pub dim: usize,
    /// Truncate sequences longer than this before padding
    pub max_length: Option<usize>,
    /// Padding placement
    pub padding: PadPosition,
    /// Truncation end for over-long sequences
    pub truncating: Truncate,
    /// Fill value
    pub value: T,
}

impl<T: Default> Default for PadConfig<T> {
    fn default() -> Self {
        Self {
            dim: 0,
            max_length: None,
            padding: PadPosition::Tail,
            truncating: Truncate::Tail,
            value: T::default(),
        }
    }
}

/// Pad a batch of arrays along `config.dim` and stack them.
///
/// Returns the stacked array, shaped `[batch, ..padded.., ..]` with the
/// padded dimension moved to position `dim + 1`, and one `(start, end)`
/// span per row marking where the real data sits in the padded dimension.
pub fn pad_sequence<T: Clone>(
    data: &[ArrayD<T>],
    config: &PadConfig<T>,
) -> Result<(ArrayD<T>, Vec<(usize, usize)>)> {
    if data.is_empty() {
        return Err(PadError::Empty.into());
    }

    let rank = data[0].ndim();
    if config.dim >= rank {
        return Err(PadError::DimOutOfRange {
            dim: config.dim,
            rank,
        }
        .into());
    }

    let mut views: Vec<ArrayViewD<'_, T>> = Vec::with_capacity(data.len());
    let mut lengths = Vec::with_capacity(data.len());
    let mut other_dims: Option<Vec<usize>> = None;

    for array in data {
        if array.ndim() != rank {
            return Err(PadError::RankMismatch {
                expected: rank,
                got: array.ndim(),
            }
            .into());
        }

        let mut view = array.view();
        if config.dim != 0 {
            view.swap_axes(0, config.dim);
        }

        match &other_dims {
            None => other_dims = Some(view.shape()[1..].to_vec()),
            Some(expected) if expected.as_slice() != &view.shape()[1..] => {
                return Err(PadError::ShapeMismatch {
                    expected: expected.clone(),
                    got: view.shape()[1..].to_vec(),
                }
                .into());
            }
            Some(_) => {}
        }

        let len = view.shape()[0];
        let view = match config.max_length {
            Some(max) if len > max => match config.truncating {
                Truncate::Head => view.slice_axis_move(Axis(0), Slice::from(len - max..len)),
                Truncate::Tail => view.slice_axis_move(Axis(0), Slice::from(..max)),
            },
            _ => view,
        };

        lengths.push(view.shape()[0]);
        views.push(view);
    }

    let max_len = lengths.iter().copied().max().unwrap_or(0);
    let other = other_dims.unwrap_or_default();

    let mut shape = Vec::with_capacity(rank + 1);
    shape.push(data.len());
    shape.push(max_len);
    shape.extend(other.iter().copied());

    let mut result = ArrayD::from_elem(IxDyn(&shape), config.value.clone());
    let mut spans = Vec::with_capacity(data.len());
    let mut rng = rand::thread_rng();

    for (i, view) in views.iter().enumerate() {
        let len = lengths[i];
        let start = match config.padding {
            PadPosition::Tail => 0,
            PadPosition::Head => max_len - len,
            PadPosition::Random => rng.gen_range(0..=max_len - len),
        };

        let mut row = result.index_axis_mut(Axis(0), i);
        row.slice_axis_mut(Axis(0), Slice::from(start..start + len))
            .assign(view);

        spans.push(match config.padding {
            PadPosition::Tail => (0, len),
            PadPosition::Head => (start, max_len),
            PadPosition::Random => (start, start + len),
        });
    }

    if config.dim != 0 {
        result.swap_axes(1, config.dim + 1);
    }

    Ok((result, spans))
}
