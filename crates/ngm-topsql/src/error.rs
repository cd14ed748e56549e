//! Error types for the Top SQL store.

use thiserror::Error;

/// Result type alias for Top SQL store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record's parallel sample arrays differ in length.
    #[error("misaligned {kind} record: {lengths:?} samples per series")]
    MisalignedRecord {
        kind: &'static str,
        lengths: Vec<usize>,
    },
}
