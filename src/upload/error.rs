use thiserror::Error;

/// Errors from the upload scheduler's configuration surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The slot-limit setting was neither "unlimited" nor an integer.
    #[error("invalid slot limit: {0:?}")]
    InvalidSlotLimit(String),
}
