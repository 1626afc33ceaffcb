//! Non-contiguous byte queue assembled from pooled chunks.
//!
//! No direct teacher counterpart — `boomnet::buffer::ReadBuffer` is a single
//! contiguous growable array. This is built from spec.md §4.2's span-list
//! description, reusing [`PooledChunk`]/[`BufferPool`] from the sibling
//! `pool` module.

use std::collections::VecDeque;

use crate::error::{Error, Result};

use super::pool::{BufferPool, PooledChunk};

struct Span<const SIZE: usize> {
    chunk: PooledChunk<SIZE>,
    /// Offset into the chunk where this span's bytes begin.
    offset: usize,
    /// Number of valid bytes in this span, starting at `offset`.
    len: usize,
    /// Absolute logical position of the first byte of this span.
    abs_start: usize,
}

impl<const SIZE: usize> Span<SIZE> {
    #[inline]
    fn abs_end(&self) -> usize {
        self.abs_start + self.len
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        &self.chunk.as_slice()[self.offset..self.offset + self.len]
    }
}

/// An ordered, non-contiguous byte sequence with independent read and write
/// cursors over a logical absolute position space.
///
/// Created per channel for the receive path, and ad-hoc for outgoing
/// encoding. Single-owner: never shared across threads without external
/// synchronization (spec.md §5's resource-sharing policy).
pub struct ChunkedBuffer<const SIZE: usize> {
    pool: BufferPool<SIZE>,
    spans: VecDeque<Span<SIZE>>,
    write_pos: usize,
    read_pos: usize,
    /// Absolute position of the oldest byte still held (the flush
    /// watermark); `rewind_to` cannot go further back than this.
    base_pos: usize,
    closed: bool,
}

impl<const SIZE: usize> ChunkedBuffer<SIZE> {
    pub fn new(pool: BufferPool<SIZE>) -> Self {
        Self {
            pool,
            spans: VecDeque::new(),
            write_pos: 0,
            read_pos: 0,
            base_pos: 0,
            closed: false,
        }
    }

    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    #[inline]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    #[inline]
    pub fn unread(&self) -> usize {
        self.write_pos - self.read_pos
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Append an already-filled chunk directly (zero-copy): used by the
    /// receive loop after a successful socket read, per spec.md §4.4 step 3
    /// (`offer(chunk, 0, N)`).
    pub fn offer(&mut self, chunk: PooledChunk<SIZE>, offset: usize, len: usize) {
        assert!(offset + len <= chunk.len(), "span exceeds chunk's filled length");
        let abs_start = self.write_pos;
        self.spans.push_back(Span { chunk, offset, len, abs_start });
        self.write_pos += len;
    }

    /// Copy `bytes` in, borrowing chunks from the pool as needed. Used for
    /// ad-hoc outgoing encoding rather than the zero-copy receive path.
    pub fn write(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let need_new_span = match self.spans.back() {
                Some(last) => last.offset + last.len >= SIZE,
                None => true,
            };
            if need_new_span {
                self.spans.push_back(Span {
                    chunk: self.pool.borrow(),
                    offset: 0,
                    len: 0,
                    abs_start: self.write_pos,
                });
            }
            let last = self.spans.back_mut().expect("just pushed");
            let capacity = SIZE - (last.offset + last.len);
            let n = capacity.min(bytes.len());
            last.chunk.remaining_mut()[..n].copy_from_slice(&bytes[..n]);
            last.chunk.advance(n);
            last.len += n;
            self.write_pos += n;
            bytes = &bytes[n..];
        }
    }

    /// Read up to `buf.len()` unread bytes, advancing the read cursor only
    /// by the number of bytes actually copied (drain-on-read semantics; the
    /// underlying chunks are released later by [`flush`](Self::flush)).
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        for span in &self.spans {
            if copied == buf.len() {
                break;
            }
            if span.abs_end() <= self.read_pos {
                continue;
            }
            let span_read_offset = self.read_pos.saturating_sub(span.abs_start);
            let available = span.len - span_read_offset;
            let n = available.min(buf.len() - copied);
            if n == 0 {
                continue;
            }
            let src = &span.bytes()[span_read_offset..span_read_offset + n];
            buf[copied..copied + n].copy_from_slice(src);
            copied += n;
            self.read_pos += n;
        }
        copied
    }

    /// Copy every unread byte out into `out` (appending) and advance the
    /// read cursor past them, for callers (protocol codecs) that need a
    /// contiguous scratch buffer to parse against.
    pub fn copy_unread_to(&mut self, out: &mut Vec<u8>) -> usize {
        let n = self.unread();
        let start = out.len();
        out.resize(start + n, 0);
        let copied = self.read(&mut out[start..]);
        debug_assert_eq!(copied, n);
        copied
    }

    /// Move the read cursor back to an earlier absolute position. Bounded
    /// below by the oldest unflushed span and above by the write cursor.
    pub fn rewind_to(&mut self, pos: usize) -> Result<()> {
        if pos < self.base_pos || pos > self.write_pos {
            return Err(Error::Usage("rewind position outside retained span range"));
        }
        self.read_pos = pos;
        Ok(())
    }

    /// Release every fully-consumed span (read cursor past its end) back to
    /// the pool.
    pub fn flush(&mut self) {
        while let Some(front) = self.spans.front() {
            if front.abs_end() > self.read_pos {
                break;
            }
            let span = self.spans.pop_front().expect("front checked above");
            self.base_pos = span.abs_end();
            let _ = span.chunk.release();
        }
    }

    /// Release every span (including unconsumed ones) and mark the buffer
    /// closed; no further writes or offers are accepted.
    pub fn close(&mut self) {
        while let Some(span) = self.spans.pop_front() {
            let _ = span.chunk.release();
        }
        self.closed = true;
    }
}

impl<const SIZE: usize> Drop for ChunkedBuffer<SIZE> {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_rewind_flush_round_trip() {
        let pool = BufferPool::<4>::default();
        let mut buf = ChunkedBuffer::new(pool);
        buf.write(b"HELLO WORLD");
        assert_eq!(buf.span_count(), 3);

        let mut out = [0u8; 5];
        let n = buf.read(&mut out);
        assert_eq!(n, 5);
        assert_eq!(&out, b"HELLO");

        buf.rewind_to(0).unwrap();
        let mut out = [0u8; 11];
        let n = buf.read(&mut out);
        assert_eq!(n, 11);
        assert_eq!(&out, b"HELLO WORLD");

        buf.flush();
        assert_eq!(buf.span_count(), 0);
    }

    #[test]
    fn rewind_before_flush_watermark_is_rejected() {
        let pool = BufferPool::<4>::default();
        let mut buf = ChunkedBuffer::new(pool);
        buf.write(b"HELLOWORLD");
        let mut out = [0u8; 4];
        buf.read(&mut out);
        buf.flush();
        assert!(buf.rewind_to(0).is_err());
        assert!(buf.rewind_to(4).is_ok());
    }

    #[test]
    fn offer_appends_a_prefilled_chunk_without_copying() {
        let pool = BufferPool::<8>::default();
        let mut chunk = pool.borrow();
        chunk.remaining_mut()[..5].copy_from_slice(b"a tes");
        chunk.advance(5);
        let mut buf = ChunkedBuffer::new(pool);
        buf.offer(chunk, 0, 5);
        assert_eq!(buf.unread(), 5);
        let mut out = [0u8; 5];
        buf.read(&mut out);
        assert_eq!(&out, b"a tes");
    }

    #[test]
    fn close_releases_unconsumed_spans() {
        let pool = BufferPool::<4>::default();
        let mut buf = ChunkedBuffer::new(pool.clone());
        buf.write(b"abcdefgh");
        let (_, total_before) = pool.stats();
        assert!(total_before >= 2);
        buf.close();
        let (free, total) = pool.stats();
        assert_eq!(free, total);
    }
}
