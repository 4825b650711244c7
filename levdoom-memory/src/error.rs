//! Errors in the library.
use thiserror::Error;

/// Errors raised by [`RecordStore`](crate::RecordStore) and its backing structures.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// The store was configured with zero capacity.
    #[error("Capacity must be positive")]
    InvalidCapacity,

    /// A prioritized replay parameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// More samples were requested than the store can provide.
    #[error("Insufficient data: requested {requested} samples, {available} available")]
    InsufficientData {
        /// Number of samples requested.
        requested: usize,

        /// Number of samples that can be drawn.
        available: usize,
    },

    /// Indices and errors passed to a priority update differ in length.
    #[error("Length mismatch: {ixs} indices and {errors} errors")]
    LengthMismatch {
        /// Number of indices.
        ixs: usize,

        /// Number of errors.
        errors: usize,
    },

    /// A tree index that does not point at a leaf.
    #[error("Invalid leaf index: {0}")]
    InvalidLeafIndex(usize),

    /// A priority that is negative or not finite.
    #[error("Invalid priority: {0}")]
    InvalidPriority(f32),

    /// A weighted draw resolved to a leaf that holds no record.
    #[error("No record stored at leaf {0}")]
    EmptySlot(usize),

    /// Trace sampling is only available with the uniform backing.
    #[error("Trace sampling is not supported in prioritized mode")]
    TracesUnsupported,

    /// The snapshot was written by a store in the other sampling mode.
    #[error("Snapshot mode does not match the store mode")]
    ModeMismatch,

    /// A tree snapshot was written by a store of another capacity.
    #[error("Snapshot capacity {found} does not match store capacity {expected}")]
    CapacityMismatch {
        /// Capacity of this store.
        expected: usize,

        /// Capacity recorded in the snapshot.
        found: usize,
    },

    /// The snapshot is structurally invalid.
    #[error("Malformed snapshot: {0}")]
    Persistence(String),

    /// I/O failure while reading or writing a snapshot.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failure of a snapshot.
    #[error(transparent)]
    Codec(#[from] bincode::Error),
}
