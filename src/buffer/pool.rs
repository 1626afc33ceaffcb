//! Fixed-size chunk allocator with borrow/return and trim hysteresis.
//!
//! Grounded on `boomnet::buffer::pool`'s `BufferPoolRef`/RAII idiom, but
//! generalized from a thread-local `Rc<RefCell<_>>` handle to a shared
//! `Arc<Mutex<_>>` one: the reactor thread and caller threads both borrow
//! and return chunks, so the pool must be `Send + Sync`.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

const DEFAULT_TRIM_PERCENTILE: f64 = 0.65;
const DEFAULT_MIN_IDEAL_FREE: usize = 10;

struct Inner<const SIZE: usize> {
    free: Vec<Box<[u8; SIZE]>>,
    total: usize,
    trim_percentile: f64,
    min_ideal_free: usize,
}

impl<const SIZE: usize> Inner<SIZE> {
    fn allocate() -> Box<[u8; SIZE]> {
        vec![0u8; SIZE].into_boxed_slice().try_into().unwrap_or_else(|_| unreachable!())
    }
}

/// Cheap, clonable handle to a shared chunk pool.
///
/// Cloning shares the same underlying free list (an `Arc` clone); it does
/// not create a second pool. `borrow`/`return_chunk` serialize access to the
/// free list behind a single mutex, matching spec's "concurrent Borrow/Return
/// is serialized" invariant.
pub struct BufferPool<const SIZE: usize> {
    inner: Arc<Mutex<Inner<SIZE>>>,
}

impl<const SIZE: usize> Clone for BufferPool<SIZE> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<const SIZE: usize> Default for BufferPool<SIZE> {
    fn default() -> Self {
        Self::new(DEFAULT_TRIM_PERCENTILE, DEFAULT_MIN_IDEAL_FREE)
    }
}

impl<const SIZE: usize> BufferPool<SIZE> {
    pub fn new(trim_percentile: f64, min_ideal_free: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                free: Vec::new(),
                total: 0,
                trim_percentile,
                min_ideal_free,
            })),
        }
    }

    /// Borrow a chunk from the free list, allocating via the factory if the
    /// free list is empty.
    pub fn borrow(&self) -> PooledChunk<SIZE> {
        let mut inner = self.inner.lock().expect("buffer pool mutex poisoned");
        let data = match inner.free.pop() {
            Some(data) => data,
            None => {
                inner.total += 1;
                Inner::<SIZE>::allocate()
            }
        };
        PooledChunk {
            data: Some(data),
            len: 0,
            pool: self.clone(),
            outstanding: true,
        }
    }

    /// Return a chunk to this pool.
    ///
    /// Fails with a usage error if `chunk` was borrowed from a different
    /// pool, or if it has already been returned. Both are programmer faults.
    pub fn return_chunk(&self, mut chunk: PooledChunk<SIZE>) -> Result<()> {
        if !Arc::ptr_eq(&self.inner, &chunk.pool.inner) {
            return Err(Error::Usage("returned chunk does not belong to this pool"));
        }
        let data = chunk.data.take().ok_or(Error::Usage("chunk already returned to its pool"))?;
        chunk.outstanding = false;

        let mut inner = self.inner.lock().expect("buffer pool mutex poisoned");
        let total = inner.total;
        let availability = (inner.free.len() + 1) as f64 / total as f64;
        if availability > inner.trim_percentile || total <= inner.min_ideal_free {
            inner.free.push(data);
        } else {
            inner.total -= 1;
        }
        Ok(())
    }

    /// Current free-list length and total issued count, for diagnostics/tests.
    pub fn stats(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("buffer pool mutex poisoned");
        (inner.free.len(), inner.total)
    }
}

/// A fixed-size byte chunk borrowed from a [`BufferPool`].
///
/// Ownership is single-owner, hand off explicitly at each boundary (receive
/// loop to `ChunkedBuffer::offer`, `ChunkedBuffer::flush`/`close` back to the
/// pool); this crate never aliases a chunk, so there's no refcount, only an
/// `outstanding` flag asserting a chunk is returned exactly once.
pub struct PooledChunk<const SIZE: usize> {
    data: Option<Box<[u8; SIZE]>>,
    len: usize,
    pool: BufferPool<SIZE>,
    outstanding: bool,
}

impl<const SIZE: usize> PooledChunk<SIZE> {
    #[inline]
    pub const fn capacity(&self) -> usize {
        SIZE
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data.as_ref().expect("chunk already returned")[..self.len]
    }

    #[inline]
    pub fn remaining_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.data.as_mut().expect("chunk already returned")[len..]
    }

    /// Advance the filled length after writing into [`remaining_mut`].
    pub fn advance(&mut self, n: usize) {
        assert!(self.len + n <= SIZE, "advance past chunk capacity");
        self.len += n;
    }

    pub fn set_len(&mut self, len: usize) {
        assert!(len <= SIZE, "len past chunk capacity");
        self.len = len;
    }

    /// Return this chunk to the pool it was borrowed from.
    pub fn release(self) -> Result<()> {
        let pool = self.pool.clone();
        pool.return_chunk(self)
    }
}

impl<const SIZE: usize> Drop for PooledChunk<SIZE> {
    /// Safety net for chunks dropped without an explicit `release`/`flush`
    /// (error/panic unwind paths): best-effort return, never panics.
    fn drop(&mut self) {
        if !self.outstanding {
            return;
        }
        if let Some(data) = self.data.take() {
            let mut inner = self.pool.inner.lock().expect("buffer pool mutex poisoned");
            let total = inner.total;
            let availability = (inner.free.len() + 1) as f64 / total as f64;
            if availability > inner.trim_percentile || total <= inner.min_ideal_free {
                inner.free.push(data);
            } else {
                inner.total -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrow_allocates_when_free_list_empty() {
        let pool = BufferPool::<16>::default();
        let chunk = pool.borrow();
        assert_eq!(chunk.capacity(), 16);
        let (free, total) = pool.stats();
        assert_eq!(free, 0);
        assert_eq!(total, 1);
    }

    #[test]
    fn return_reuses_chunk_when_above_trim_threshold() {
        let pool = BufferPool::<16>::new(0.65, 10);
        let a = pool.borrow();
        let b = pool.borrow();
        let c = pool.borrow();
        pool.return_chunk(a).unwrap();
        pool.return_chunk(b).unwrap();
        pool.return_chunk(c).unwrap();
        // total stays small (<= min_ideal_free), so everything is kept.
        let (free, total) = pool.stats();
        assert_eq!(free, 3);
        assert_eq!(total, 3);
    }

    #[test]
    fn return_evicts_once_above_min_ideal_and_below_trim_threshold() {
        let pool = BufferPool::<16>::new(0.65, 10);
        let mut chunks = Vec::new();
        for _ in 0..14 {
            chunks.push(pool.borrow());
        }
        let (_, total) = pool.stats();
        assert_eq!(total, 14);
        for chunk in chunks {
            pool.return_chunk(chunk).unwrap();
        }
        let (free, total) = pool.stats();
        assert!(free >= 10 && free <= 14, "free={free}");
        assert!(total <= 14);
    }

    #[test]
    fn returning_to_a_foreign_pool_is_a_usage_error() {
        let a = BufferPool::<16>::default();
        let b = BufferPool::<16>::default();
        let chunk = a.borrow();
        let err = b.return_chunk(chunk).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn returning_twice_is_a_usage_error() {
        let pool = BufferPool::<16>::default();
        let chunk = pool.borrow();
        let data_ptr = chunk.as_slice().as_ptr();
        let _ = data_ptr;
        pool.return_chunk(chunk).unwrap();
        // can't double-return the same chunk value (moved), but release()
        // on an already-returned chunk surfaces the same error path:
        let chunk = pool.borrow();
        let mut stale = chunk;
        stale.data.take();
        stale.outstanding = false;
        let err = pool.return_chunk(stale).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn dropping_without_release_still_returns_to_pool() {
        let pool = BufferPool::<16>::default();
        {
            let _chunk = pool.borrow();
        }
        let (free, total) = pool.stats();
        assert_eq!(free, 1);
        assert_eq!(total, 1);
    }
}
