//! Bus layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BusError {
    #[error("Failed to open bus: {0}")]
    OpenFailed(String),

    #[error("Bus is shut down")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Filter configuration failed: {0}")]
    FilterFailed(String),

    #[error("Bus not supported: {0}")]
    Unsupported(String),
}
