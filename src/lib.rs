//! Event-driven TCP channel framework.
//!
//! The core of this crate is a typed, bidirectional handler [`pipeline`] driven
//! by a [`channel`] state machine, backed by a pooled chunked [`buffer`] and a
//! background reactor thread. HTTP/1.x ([`http`]), WebSocket ([`ws`]) and an
//! HPACK/HTTP2 sketch ([`h2`]) are pluggable modules installed on top of the core.

pub mod buffer;
pub mod channel;
pub mod error;
#[cfg(feature = "h2")]
pub mod h2;
#[cfg(feature = "http")]
pub mod http;
pub mod pipeline;
pub mod promise;
mod reactor;
pub mod stream;
mod util;
#[cfg(feature = "ws")]
pub mod ws;

pub use error::{Error, Result};
