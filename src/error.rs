//! Error kinds shared across the channel core and its protocol modules.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds as described by the channel core contract: state conflicts are
/// synchronous caller errors, transport/handshake failures fold into channel
/// closure, parse errors are logged and leave the payload for the caller to
/// inspect, usage errors are programmer faults, and timeouts never cancel the
/// underlying operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation illegal for the channel's current state (`send` before
    /// `CONNECTED`, `connect` on a non-`DISCONNECTED` channel, ...).
    #[error("state conflict: {0}")]
    StateConflict(&'static str),

    /// Socket-level read/write/accept failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// TLS negotiation failed.
    #[error("tls handshake failed: {0}")]
    Handshake(String),

    /// A protocol module failed to parse a malformed payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// Pool misuse or invalid handler wiring. Always a programmer fault.
    #[error("usage error: {0}")]
    Usage(&'static str),

    /// A bounded wait (promise wait, write-serialization acquisition) expired.
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    pub fn state_conflict(msg: &'static str) -> Self {
        Error::StateConflict(msg)
    }
}

impl Clone for Error {
    /// `io::Error` isn't `Clone`, so a transport error is reconstructed from
    /// its kind and message (losing any `source()` chain). Needed so a
    /// completed [`crate::promise::Promise`] can be observed by more than
    /// one waiter.
    fn clone(&self) -> Self {
        match self {
            Error::StateConflict(s) => Error::StateConflict(s),
            Error::Transport(e) => Error::Transport(io::Error::new(e.kind(), e.to_string())),
            Error::Handshake(s) => Error::Handshake(s.clone()),
            Error::Parse(s) => Error::Parse(s.clone()),
            Error::Usage(s) => Error::Usage(s),
            Error::Timeout => Error::Timeout,
        }
    }
}
