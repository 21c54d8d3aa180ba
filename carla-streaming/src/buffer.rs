//! Pooled byte buffers and their shared, immutable views.
//!
//! A [`Buffer`] is the single mutable owner of a chunk of memory that a
//! producer (socket read, sensor serializer) fills in place. Once the data is
//! ready to be handed to one or more consumers it is frozen into a
//! [`BufferView`], a cheap `Clone` handle over the same bytes that can be
//! fanned out to many sessions without copying.
//!
//! Buffers recycle their storage through a [`BufferPool`] using a weak
//! back-reference: the pool never holds a strong reference to outstanding
//! buffers, so a pool can be dropped (e.g. on shutdown) without needing to
//! wait for every buffer borrowed from it to come back first.

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

type FreeList = Mutex<Vec<Vec<u8>>>;

/// A growable, pool-backed byte buffer.
///
/// `Buffer` owns exactly one `Vec<u8>`. Dropping a `Buffer` that was checked
/// out of a pool returns its storage to that pool for reuse, unless the
/// storage was already taken by [`Buffer::freeze`].
pub struct Buffer {
    data: Vec<u8>,
    pool: Option<Weak<FreeList>>,
}

impl Buffer {
    /// Creates a standalone buffer with the given initial capacity that is
    /// not attached to any pool.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(capacity),
            pool: None,
        }
    }

    /// Wraps already-filled bytes in a standalone buffer.
    #[inline]
    pub fn from_vec(data: Vec<u8>) -> Buffer {
        Buffer { data, pool: None }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The slice containing the bytes written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// A mutable view used by readers to fill the buffer in place.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Resizes the buffer to exactly `len` bytes, zero-filling any growth.
    #[inline]
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len, 0);
    }

    /// Consumes the buffer and turns it into a shared, immutable view.
    ///
    /// The buffer detaches from its pool permanently: the bytes are now
    /// owned by however many clones of the returned [`BufferView`] exist,
    /// and the pool's storage slot is not reclaimed until the last clone is
    /// dropped.
    #[inline]
    pub fn freeze(mut self) -> BufferView {
        let data = std::mem::take(&mut self.data);
        BufferView(Bytes::from(data))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.data.capacity() == 0 {
            return;
        }
        if let Some(pool) = self.pool.as_ref().and_then(Weak::upgrade) {
            let mut data = std::mem::take(&mut self.data);
            data.clear();
            pool.lock().unwrap().push(data);
        }
    }
}

/// A pool of reusable `Vec<u8>` backing stores for [`Buffer`].
///
/// Checking out a buffer reuses a previously returned allocation when one is
/// available, falling back to a fresh allocation of `default_capacity`
/// otherwise. The pool itself is cheap to clone; every clone shares the same
/// free list.
#[derive(Clone)]
pub struct BufferPool {
    free: Arc<FreeList>,
    default_capacity: usize,
}

impl BufferPool {
    pub fn new(default_capacity: usize) -> BufferPool {
        BufferPool {
            free: Arc::new(Mutex::new(Vec::new())),
            default_capacity,
        }
    }

    /// Number of allocations currently sitting idle in the pool.
    pub fn len(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks out a buffer, reusing a recycled allocation if the free list
    /// is non-empty.
    pub fn pop(&self) -> Buffer {
        let mut data = self
            .free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.default_capacity));
        data.clear();
        Buffer {
            data,
            pool: Some(Arc::downgrade(&self.free)),
        }
    }
}

/// A shared, reference-counted, immutable view over bytes that were once a
/// [`Buffer`].
///
/// Cloning a `BufferView` is a cheap atomic increment; it never copies the
/// underlying bytes. This is the type fanned out to every session attached
/// to a stream when a sensor produces a frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BufferView(Bytes);

impl BufferView {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for BufferView {
    fn from(data: Vec<u8>) -> Self {
        BufferView(Bytes::from(data))
    }
}

impl From<Bytes> for BufferView {
    fn from(data: Bytes) -> Self {
        BufferView(data)
    }
}

impl std::ops::Deref for BufferView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_reuses_returned_storage() {
        let pool = BufferPool::new(64);
        assert_eq!(pool.len(), 0);

        let mut buf = pool.pop();
        buf.extend_from_slice(&[1, 2, 3]);
        drop(buf);

        assert_eq!(pool.len(), 1);

        let buf = pool.pop();
        assert_eq!(pool.len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn freeze_detaches_from_pool() {
        let pool = BufferPool::new(64);
        let mut buf = pool.pop();
        buf.extend_from_slice(&[9, 8, 7]);

        let view = buf.freeze();
        assert_eq!(view.as_slice(), &[9, 8, 7]);

        // The checked-out allocation was moved into the view, so nothing
        // comes back to the pool.
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn view_can_be_shared_across_many_holders() {
        let view = BufferView::from(vec![1, 2, 3, 4]);
        let fanout: Vec<BufferView> = (0..8).map(|_| view.clone()).collect();

        for v in &fanout {
            assert_eq!(v.as_slice(), view.as_slice());
        }
    }

    #[test]
    fn dropping_pool_does_not_panic_outstanding_buffers() {
        let pool = BufferPool::new(64);
        let buf = pool.pop();
        drop(pool);
        // The buffer's back-reference is weak; dropping it after the pool
        // is gone must not try to upgrade a dead Weak and panic.
        drop(buf);
    }
}
