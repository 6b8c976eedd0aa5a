use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use crossbeam_queue::ArrayQueue;

/// Which side of the pipeline currently owns a pool slot.
///
/// Every buffer is in exactly one of these states at any instant, so
/// `free + in_hardware + queued + checked_out` always equals the pool
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Owner {
    /// Sitting in the pool's free queue.
    Free = 0,
    /// Submitted to the output port, waiting to be filled.
    InHardware = 1,
    /// Filled and parked in the frame queue.
    InQueue = 2,
    /// Handed to the consumer, waiting for release.
    CheckedOut = 3,
}

impl Owner {
    fn from_u8(value: u8) -> Owner {
        match value {
            1 => Owner::InHardware,
            2 => Owner::InQueue,
            3 => Owner::CheckedOut,
            _ => Owner::Free,
        }
    }
}

/// A fixed-capacity block of frame memory plus its fill metadata.
///
/// Buffers are created once when the pool is allocated and move by value
/// between the pool, the hardware port, the frame queue and the consumer.
/// They are never resized.
///
/// # Example
/// ```rust
/// use ocular_core::prelude::{BufferPool, Owner};
///
/// let pool = BufferPool::allocate(1, 16);
/// let mut buf = pool.checkout(Owner::InHardware).unwrap();
/// buf.fill(&[1, 2, 3]);
/// assert_eq!(buf.payload(), &[1, 2, 3]);
/// pool.release(buf);
/// ```
pub struct PoolBuffer {
    index: usize,
    data: Box<[u8]>,
    len: usize,
    timestamp_us: u64,
}

impl PoolBuffer {
    /// Slot index within the owning pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes of valid payload currently in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer carries no payload (an end-of-stream style marker).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed byte capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The valid payload slice.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Overwrite the payload, truncating to the buffer capacity.
    pub fn fill(&mut self, payload: &[u8]) {
        let len = payload.len().min(self.data.len());
        self.data[..len].copy_from_slice(&payload[..len]);
        self.len = len;
    }

    /// Capture timestamp in microseconds, as stamped by the driver.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Stamp the capture time.
    pub fn set_timestamp_us(&mut self, timestamp_us: u64) {
        self.timestamp_us = timestamp_us;
    }

    fn clear(&mut self) {
        self.len = 0;
        self.timestamp_us = 0;
    }
}

impl fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("index", &self.index)
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .field("timestamp_us", &self.timestamp_us)
            .finish()
    }
}

/// Snapshot of slot ownership across the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounts {
    pub free: usize,
    pub in_hardware: usize,
    pub queued: usize,
    pub checked_out: usize,
}

impl PoolCounts {
    /// Total buffers accounted for; always equals the pool capacity.
    pub fn total(&self) -> usize {
        self.free + self.in_hardware + self.queued + self.checked_out
    }
}

/// A fixed-size set of preallocated frame buffers shared by the producer
/// and consumer contexts.
///
/// `checkout` never blocks; it returns `None` when every buffer is out,
/// and the caller decides whether to wait or drop. The free list is a
/// lock-free queue so the hardware callback thread is never parked.
///
/// # Example
/// ```rust
/// use ocular_core::prelude::{BufferPool, Owner};
///
/// let pool = BufferPool::allocate(2, 64);
/// let a = pool.checkout(Owner::InHardware).unwrap();
/// let b = pool.checkout(Owner::InHardware).unwrap();
/// assert!(pool.checkout(Owner::InHardware).is_none());
/// pool.release(a);
/// pool.release(b);
/// assert_eq!(pool.counts().free, 2);
/// ```
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: ArrayQueue<PoolBuffer>,
    // Ownership tags are instrumentation for the conservation invariant;
    // the free queue and the frame queue provide the actual synchronization.
    owners: Box<[AtomicU8]>,
    buffer_size: usize,
}

impl BufferPool {
    /// Preallocate `count` buffers of `buffer_size` bytes each.
    pub fn allocate(count: usize, buffer_size: usize) -> Self {
        let free = ArrayQueue::new(count.max(1));
        for index in 0..count {
            let buf = PoolBuffer {
                index,
                data: vec![0; buffer_size].into_boxed_slice(),
                len: 0,
                timestamp_us: 0,
            };
            let _ = free.push(buf);
        }
        let owners = (0..count)
            .map(|_| AtomicU8::new(Owner::Free as u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            inner: Arc::new(PoolInner {
                free,
                owners,
                buffer_size,
            }),
        }
    }

    /// Take a free buffer and tag it with its destination owner.
    ///
    /// Never blocks; `None` means the pool is exhausted right now.
    pub fn checkout(&self, owner: Owner) -> Option<PoolBuffer> {
        debug_assert!(owner != Owner::Free);
        let buf = self.inner.free.pop()?;
        self.inner.owners[buf.index].store(owner as u8, Ordering::Relaxed);
        Some(buf)
    }

    /// Return a buffer to the free queue and clear its metadata.
    pub fn release(&self, mut buf: PoolBuffer) {
        buf.clear();
        self.inner.owners[buf.index].store(Owner::Free as u8, Ordering::Relaxed);
        let pushed = self.inner.free.push(buf);
        debug_assert!(pushed.is_ok(), "pool free queue overflow");
    }

    /// Record a hand-off of a buffer between owners without moving it
    /// through the pool.
    pub fn retag(&self, buf: &PoolBuffer, owner: Owner) {
        self.inner.owners[buf.index].store(owner as u8, Ordering::Relaxed);
    }

    /// Snapshot of slot ownership.
    pub fn counts(&self) -> PoolCounts {
        let mut counts = PoolCounts::default();
        for tag in self.inner.owners.iter() {
            match Owner::from_u8(tag.load(Ordering::Relaxed)) {
                Owner::Free => counts.free += 1,
                Owner::InHardware => counts.in_hardware += 1,
                Owner::InQueue => counts.queued += 1,
                Owner::CheckedOut => counts.checked_out += 1,
            }
        }
        counts
    }

    /// Number of buffers this pool was allocated with.
    pub fn capacity(&self) -> usize {
        self.inner.owners.len()
    }

    /// Byte capacity of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_succeeds_exactly_capacity_times() {
        let pool = BufferPool::allocate(4, 32);
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.checkout(Owner::InHardware).expect("free buffer"));
        }
        assert!(pool.checkout(Owner::InHardware).is_none());

        for buf in held.drain(..) {
            pool.release(buf);
        }
        for _ in 0..4 {
            held.push(pool.checkout(Owner::InHardware).expect("free buffer"));
        }
        assert!(pool.checkout(Owner::InHardware).is_none());
    }

    #[test]
    fn counts_conserve_capacity() {
        let pool = BufferPool::allocate(3, 16);
        let a = pool.checkout(Owner::InHardware).unwrap();
        let b = pool.checkout(Owner::InQueue).unwrap();
        let counts = pool.counts();
        assert_eq!(counts.free, 1);
        assert_eq!(counts.in_hardware, 1);
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.total(), pool.capacity());

        pool.retag(&b, Owner::CheckedOut);
        assert_eq!(pool.counts().checked_out, 1);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.counts().free, 3);
        assert_eq!(pool.counts().total(), pool.capacity());
    }

    #[test]
    fn release_clears_fill_metadata() {
        let pool = BufferPool::allocate(1, 8);
        let mut buf = pool.checkout(Owner::InHardware).unwrap();
        buf.fill(&[9; 8]);
        buf.set_timestamp_us(1234);
        pool.release(buf);

        let buf = pool.checkout(Owner::InHardware).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.timestamp_us(), 0);
        pool.release(buf);
    }

    #[test]
    fn fill_truncates_to_capacity() {
        let pool = BufferPool::allocate(1, 4);
        let mut buf = pool.checkout(Owner::InHardware).unwrap();
        buf.fill(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.payload(), &[1, 2, 3, 4]);
        pool.release(buf);
    }
}
