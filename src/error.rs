//! Error types organized by pipeline stage.

use thiserror::Error;

/// Crate error variants organized by stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Index table persistence error
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Chunk loading stage error
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Progress bookkeeping error
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Batch padding error
    #[error(transparent)]
    Pad(#[from] PadError),

    /// Held-out data requested but none was retained at construction
    #[error("no data was retained at construction time")]
    NoRetainedData,
}

/// Iterator configuration errors, raised at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Batch size must be positive
    #[error("batch size must be a positive integer")]
    InvalidBatchSize,

    /// Explicit chunk count must be positive
    #[error("explicit chunk count must be a positive integer")]
    InvalidChunkCount,

    /// Retain fraction outside the accepted range
    #[error("retain fraction {0} outside [0.0, 0.9]")]
    InvalidRetainFraction(f64),
}

/// Index table load/save errors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// JSON (de)serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// IO error while reading or writing a table
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Chunk loading and transform errors, surfaced when a load is joined.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Loader or transform failure for one chunk
    #[error("chunk load failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Transform contract violation: no samples produced
    #[error("transform produced no samples for chunk {chunk}")]
    EmptyTransformOutput { chunk: usize },

    /// Background load thread panicked
    #[error("background chunk load panicked")]
    WorkerPanicked,

    /// Join requested while no load was in flight
    #[error("no chunk load in flight")]
    NoPendingLoad,

    /// IO error during chunk loading
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// Wrap an arbitrary loader/transform failure.
    pub fn source(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        LoadError::Source(err.into())
    }
}

/// Training-progress bookkeeping errors.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Statistics requested before anything was collected
    #[error("no reports have been collected yet")]
    NothingCollected,

    /// Saved archive not found under its expected name prefix
    #[error("archive not found after save: {prefix}")]
    ArchiveMissing { prefix: String },

    /// More than one file matches a saved archive's name prefix
    #[error("multiple archives match prefix: {prefix}")]
    ArchiveAmbiguous { prefix: String },

    /// IO error on the log file or archive directory
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Batch padding errors.
#[derive(Debug, Error)]
pub enum PadError {
    /// No arrays to pad
    #[error("cannot pad an empty batch")]
    Empty,

    /// Arrays in the batch have different ranks
    #[error("rank mismatch: expected {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Arrays differ in a dimension other than the padded one
    #[error("shape mismatch off the padded dimension: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// Padded dimension out of range for the arrays' rank
    #[error("pad dimension {dim} out of range for rank {rank}")]
    DimOutOfRange { dim: usize, rank: usize },
}

/// Result type alias for uttfeed operations.
pub type Result<T> = std::result::Result<T, Error>;
