use thiserror::Error;

use crate::protocol::{Direction, State};

/// Malformed or unexpected wire data. Always fatal to the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("varint too long")]
    VarintTooLong,
    #[error("frame of {0} bytes exceeds the protocol limit")]
    FrameTooBig(usize),
    #[error("compressed frame declares {declared} bytes but threshold is {threshold}")]
    BelowThreshold { declared: usize, threshold: usize },
    #[error("compressed frame inflated to {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(i32),
    #[error("no packet table for {direction:?} {state} packets")]
    NoMapping { state: State, direction: Direction },
    #[error("packet {packet} is not mapped for {direction:?} {state}")]
    UnmappedPacket { packet: &'static str, state: State, direction: Direction },
    #[error("{packet} was not fully read ({remaining} bytes left)")]
    TrailingBytes { packet: &'static str, remaining: usize },
    #[error("unexpected packet {got} while waiting for {expected}")]
    UnexpectedPacket { expected: &'static str, got: String },
    #[error("invalid next state {0} in handshake")]
    InvalidIntent(i32),
    #[error("connection closed")]
    ConnectionClosed,
}

/// Whether `err` only says the peer hung up.
pub fn is_closed(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ProtocolError>(), Some(ProtocolError::ConnectionClosed))
}

/// Failure of the online-mode authentication handshake.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("verify token mismatch")]
    VerifyTokenMismatch,
    #[error("shared secret must be 16 bytes, got {0}")]
    InvalidSecret(usize),
    #[error("rsa: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("invalid public key: {0}")]
    PublicKey(#[from] rsa::pkcs8::spki::Error),
    #[error("session server rejected {0}")]
    Rejected(String),
    #[error("session server unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("session server answered {0}")]
    Status(u16),
}

/// Expected login outcomes. These are not failures of the server.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("Invalid username")]
    InvalidName,
    #[error("The server is full")]
    ServerFull,
    #[error("You are already connected to this server")]
    AlreadyConnected,
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(i32),
}

/// Failure to bring up or keep a backend connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("backend {name} unreachable: {source}")]
    Unreachable {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown backend {0}")]
    UnknownBackend(String),
    #[error("kicked by backend: {0}")]
    Kicked(String),
    #[error("backend requires online-mode authentication but no account is configured")]
    EncryptionUnsupported,
    #[error("backend authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("backend protocol mismatch: {0}")]
    Protocol(String),
}
