//! Transport layer errors

use thiserror::Error;

/// Faults raised by an ISO-TP stack
///
/// Protocol faults (`Framing`, `Timeout`, `Overflow`) are reported through
/// the stack's error handler and absorbed by the pump; only submit and open
/// failures reach callers directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Malformed frame: {0}")]
    Framing(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Buffer overflow: {0}")]
    Overflow(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Failed to open transport: {0}")]
    OpenFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}
