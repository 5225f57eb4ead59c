//! The error taxonomy of the session engine.
//!
//! Each layer gets its own `thiserror`-derived enum; `Error` composes them
//! for callers that just want one type to match on.

use thiserror::Error;

use crate::sasl::SaslError;
use crate::scram::ScramError;

/// Transport-level failures: connecting, reading, writing, TLS.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out connecting to {host}:{port}")]
    ConnectTimeout { host: String, port: u16 },
    #[error("read from transport failed: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("write to transport failed: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("pinned certificate did not match: expected sha512 {expected}, got {actual}")]
    TlsPinMismatch { expected: String, actual: String },
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
    #[error("invalid host/address: {0}")]
    InvalidAddress(String),
}

/// Protocol-level failures: disconnects and malformed lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("server closed the connection")]
    ServerDisconnected,
    #[error("no data received within the ping timeout; connection considered dead")]
    UnexpectedDisconnect,
    #[error("failed to parse line: {0:?}")]
    ParseFailed(String),
}

/// Failures specific to the CAP/STS/Resume handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("registration was cancelled by a successful session resume")]
    Cancelled,
    #[error("server requested an STS upgrade; reconnect required")]
    StsReconnectRequested,
}

/// Failures while waiting for a matching line.
#[derive(Debug, Error)]
pub enum WaitForError {
    #[error("timed out waiting for a matching line")]
    Timeout,
    #[error("session disconnected while a wait_for was outstanding")]
    CancelledByDisconnect,
}

/// Top-level error type returned by the session's public operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Sasl(#[from] SaslError),
    #[error(transparent)]
    Scram(#[from] ScramError),
    #[error(transparent)]
    WaitFor(#[from] WaitForError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
