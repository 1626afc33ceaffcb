//! Pooled, fixed-size byte chunks and the chunked buffer built from them.
//!
//! Bytes arriving at a socket are placed into chunks borrowed from a
//! [`BufferPool`], appended to a channel's receive [`ChunkedBuffer`], and
//! offered to the incoming pipeline. The outgoing path mirrors this: a
//! handler lowers a typed payload to a `ChunkedBuffer`, which the reactor
//! drains chunk by chunk onto the socket.

mod chunked;
mod pool;

pub use chunked::ChunkedBuffer;
pub use pool::{BufferPool, PooledChunk};

/// The chunk size used throughout the channel core, HTTP and WebSocket
/// modules. `BufferPool`/`ChunkedBuffer` stay generic over chunk size (the
/// unit tests exercise small sizes to make span boundaries easy to reason
/// about), but the rest of the crate standardizes on one size so a
/// `BufferPool` can be shared across every channel a process opens.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

pub type DefaultBufferPool = BufferPool<DEFAULT_CHUNK_SIZE>;
pub type DefaultChunkedBuffer = ChunkedBuffer<DEFAULT_CHUNK_SIZE>;
