//! Small internal helpers shared by the reactor and stream implementations.

use std::io;
use std::io::ErrorKind::WouldBlock;

/// Adapts a non-blocking write result: a `WouldBlock` error becomes `Ok(0)` /
/// `Ok(())` rather than propagating, since the caller (the reactor's send
/// loop) already knows to retry on the next writable readiness event.
pub trait NoBlock {
    type Value;

    fn no_block(self) -> io::Result<Self::Value>;
}

impl NoBlock for io::Result<usize> {
    type Value = usize;

    fn no_block(self) -> io::Result<Self::Value> {
        match self {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }
}

impl NoBlock for io::Result<()> {
    type Value = ();

    fn no_block(self) -> io::Result<Self::Value> {
        match self {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == WouldBlock => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Outcome of a single non-blocking read attempt, distinguishing "no data yet"
/// from "peer closed" so the receive loop (spec.md §4.4 step 4) can tell them
/// apart: the raw `io::Result<usize>` collapses both to `Ok(0)`.
pub enum ReadOutcome {
    WouldBlock,
    Eof,
    Read(usize),
}

pub fn classify_read(result: io::Result<usize>) -> io::Result<ReadOutcome> {
    match result {
        Ok(0) => Ok(ReadOutcome::Eof),
        Ok(n) => Ok(ReadOutcome::Read(n)),
        Err(err) if err.kind() == WouldBlock => Ok(ReadOutcome::WouldBlock),
        Err(err) => Err(err),
    }
}
