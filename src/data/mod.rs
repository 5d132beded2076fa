//! Dataset loading and splitting

mod record;
mod split;

pub use record::{load_records, PatientRecord};
pub use split::split_train_eval;

/// Error type for data-layer operations
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Failed to read dataset: {0}")]
    ReadError(String),

    #[error("Malformed record at row {row}: {message}")]
    MalformedRecord { row: usize, message: String },
}
