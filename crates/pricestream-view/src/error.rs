//! Error types for pricestream-view.

use pricestream_core::CoreError;
use thiserror::Error;

/// View layer errors.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Board actor has stopped")]
    BoardClosed,

    #[error("Encode error: {0}")]
    Encode(#[from] CoreError),
}

/// Result type alias for view operations.
pub type ViewResult<T> = std::result::Result<T, ViewError>;
