//! Diagnostic and discovery errors

use thiserror::Error;

use crate::bus::BusError;
use crate::transport::TransportError;

/// Errors surfaced by sessions, the oracle and the discovery algorithms
#[derive(Debug, Error)]
pub enum DiagError {
    /// Structural violation in a diagnostic response (wrong tag, bad length)
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The ECU did not answer and the caller needed an answer
    #[error("No response from ECU")]
    NoResponse,

    /// Every checksum candidate was rejected by the ECU
    #[error("No valid checksum found for body {body}")]
    NoValidChecksumFound { body: String },

    /// ISO-TP transport fault that reached the caller
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Raw bus fault
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Another diagnostic session currently owns the bus filter
    #[error("A diagnostic session is already active on this connection")]
    SessionBusy,

    /// Frame could not be constructed
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type DiagResult<T> = Result<T, DiagError>;
