//! Single-producer/single-consumer command buffer.
//!
//! [`fifo`] allocates a fixed-capacity byte ring shared by exactly one
//! [`FifoProducer`] (the CPU side) and one [`FifoConsumer`] (the decode
//! loop). Both cursors live in one packed `AtomicU64`, write position in
//! the high half and read position in the low half, so either side sees a
//! consistent pair with a single acquire load.
//!
//! Positions are byte counts since the last reset, wrapping at 2^32. The
//! slot for a position is `position & (capacity - 1)`.

use std::hint;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use flipper_core::{FifoError, PeekSource, StreamSource};
use flipper_replay::ReplaySink;
use tracing::{error, info};

/// Cursor word published while the consumer is rewinding the buffer.
///
/// `read = write + 1` can never occur in a live buffer, so producers
/// recognise it and wait.
const RESETTING: u64 = 1;

#[inline]
fn pack(write: u32, read: u32) -> u64 {
    ((write as u64) << 32) | read as u64
}

#[inline]
fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, state as u32)
}

struct Shared {
    storage: Box<[AtomicU8]>,
    state: AtomicU64,
    mask: u32,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    fn slot(&self, position: u32) -> &AtomicU8 {
        &self.storage[(position & self.mask) as usize]
    }
}

// Compile-time assertion: both handles can move to their own threads.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<FifoProducer>();
    assert::<FifoConsumer>();
};

/// Allocate a command buffer of `capacity` bytes.
///
/// `tail_end` is the write position above which a fully drained buffer
/// may be rewound by [`FifoConsumer::try_reset`].
///
/// # Panics
///
/// Panics if `capacity` is not a power of two between 16 and 2^31, or if
/// `tail_end >= capacity`. [`ProcessorConfig::validate`] reports the same
/// conditions as errors.
///
/// [`ProcessorConfig::validate`]: crate::config::ProcessorConfig::validate
pub fn fifo(capacity: usize, tail_end: usize) -> (FifoProducer, FifoConsumer) {
    assert!(
        capacity.is_power_of_two() && (16..=1 << 31).contains(&capacity),
        "command buffer capacity must be a power of two in 16..=2^31, got {capacity}"
    );
    assert!(
        tail_end < capacity,
        "tail_end {tail_end} must be below capacity {capacity}"
    );
    let storage = (0..capacity).map(|_| AtomicU8::new(0)).collect();
    let shared = Arc::new(Shared {
        storage,
        state: AtomicU64::new(0),
        mask: (capacity - 1) as u32,
    });
    (
        FifoProducer {
            shared: Arc::clone(&shared),
            pushed: 0,
        },
        FifoConsumer {
            shared,
            read: 0,
            popped: 0,
            tail_end: tail_end as u32,
        },
    )
}

// ── Producer ────────────────────────────────────────────────────

/// Producer handle. Appends bytes at the write cursor.
pub struct FifoProducer {
    shared: Arc<Shared>,
    /// Bytes pushed since creation, across resets.
    pushed: u64,
}

impl FifoProducer {
    /// Append `bytes` atomically: either all are published or none.
    ///
    /// Fails with [`FifoError::Overflow`] when the free space is smaller
    /// than `bytes.len()`. If the consumer is rewinding the buffer, waits
    /// for it to finish and writes at the rewound position.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), FifoError> {
        let shared = &*self.shared;
        loop {
            let state = shared.state.load(Ordering::Acquire);
            if state == RESETTING {
                hint::spin_loop();
                continue;
            }
            let (write, read) = unpack(state);
            let free = shared.capacity() - write.wrapping_sub(read) as usize;
            if bytes.len() > free {
                error!(
                    requested = bytes.len(),
                    free, "command buffer overflow; push rejected"
                );
                return Err(FifoError::Overflow {
                    requested: bytes.len(),
                    free,
                });
            }
            for (i, &b) in bytes.iter().enumerate() {
                shared
                    .slot(write.wrapping_add(i as u32))
                    .store(b, Ordering::Relaxed);
            }
            let next = pack(write.wrapping_add(bytes.len() as u32), read);
            // The consumer may have committed a read or started a reset
            // since the load; republish against the new cursor word.
            if shared
                .state
                .compare_exchange(state, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.pushed += bytes.len() as u64;
                return Ok(());
            }
        }
    }

    /// Append one byte.
    pub fn push_u8(&mut self, v: u8) -> Result<(), FifoError> {
        self.push(&[v])
    }

    /// Append a big-endian 16-bit value.
    pub fn push_u16(&mut self, v: u16) -> Result<(), FifoError> {
        self.push(&v.to_be_bytes())
    }

    /// Append a big-endian 32-bit value.
    pub fn push_u32(&mut self, v: u32) -> Result<(), FifoError> {
        self.push(&v.to_be_bytes())
    }

    /// Free space at the time of the call.
    pub fn free(&self) -> usize {
        let state = self.shared.state.load(Ordering::Acquire);
        if state == RESETTING {
            return 0;
        }
        let (write, read) = unpack(state);
        self.shared.capacity() - write.wrapping_sub(read) as usize
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Total bytes published since creation. Unaffected by resets, so it
    /// can be compared with [`FifoConsumer::consumed`].
    pub fn pushed(&self) -> u64 {
        self.pushed
    }
}

impl ReplaySink for FifoProducer {
    type Error = FifoError;

    fn push(&mut self, byte: u8) -> Result<(), FifoError> {
        self.push_u8(byte)
    }

    fn push_slice(&mut self, bytes: &[u8]) -> Result<(), FifoError> {
        FifoProducer::push(self, bytes)
    }
}

// ── Consumer ────────────────────────────────────────────────────

/// Consumer handle. Pops bytes at a local read cursor and publishes it
/// with [`FifoConsumer::commit`].
pub struct FifoConsumer {
    shared: Arc<Shared>,
    /// Local read position; may run ahead of the published one until
    /// `commit`.
    read: u32,
    /// Bytes popped since creation, across resets.
    popped: u64,
    tail_end: u32,
}

impl FifoConsumer {
    fn load(&self) -> (u32, u32) {
        unpack(self.shared.state.load(Ordering::Acquire))
    }

    /// Bytes pushed but not yet popped.
    ///
    /// # Panics
    ///
    /// Panics if the read cursor has passed the write cursor. That state
    /// means the stream is corrupt and nothing downstream can be trusted.
    pub fn bytes_available(&self) -> usize {
        let (write, _) = self.load();
        let available = write.wrapping_sub(self.read) as usize;
        assert!(
            available <= self.shared.capacity(),
            "command buffer read cursor {} passed write cursor {write}",
            self.read
        );
        available
    }

    /// Publish the local read cursor, releasing the consumed space to the
    /// producer.
    pub fn commit(&mut self) {
        let read = self.read;
        let _ = self
            .shared
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (write, _) = unpack(state);
                Some(pack(write, read))
            });
    }

    /// Rewind both cursors to zero and zero the storage.
    ///
    /// Only happens when every pushed byte has been consumed and the write
    /// cursor is beyond the tail end. Returns whether the reset happened.
    pub fn try_reset(&mut self) -> bool {
        let state = self.shared.state.load(Ordering::Acquire);
        let (write, _) = unpack(state);
        if write != self.read || write <= self.tail_end {
            return false;
        }
        if self
            .shared
            .state
            .compare_exchange(state, RESETTING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Producer pushed in between; not drained any more.
            return false;
        }
        for slot in self.shared.storage.iter() {
            slot.store(0, Ordering::Relaxed);
        }
        self.shared.state.store(0, Ordering::Release);
        self.read = 0;
        info!(write_position = write, "command buffer reset");
        true
    }

    /// Drop every unconsumed byte and publish the new read cursor.
    ///
    /// Returns the number of bytes discarded.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.bytes_available();
        self.read = self.read.wrapping_add(discarded as u32);
        self.popped += discarded as u64;
        self.commit();
        discarded
    }

    /// Total bytes popped or discarded since creation. Unaffected by
    /// resets.
    pub fn consumed(&self) -> u64 {
        self.popped
    }

    /// Local read position.
    pub fn read_position(&self) -> u32 {
        self.read
    }

    /// Published write position.
    pub fn write_position(&self) -> u32 {
        self.load().0
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Write position above which a drained buffer may be reset.
    pub fn tail_end(&self) -> usize {
        self.tail_end as usize
    }
}

impl StreamSource for FifoConsumer {
    fn pop_u8(&mut self) -> u8 {
        let b = self.shared.slot(self.read).load(Ordering::Relaxed);
        self.read = self.read.wrapping_add(1);
        self.popped += 1;
        b
    }

    fn position(&self) -> u64 {
        self.popped
    }
}

impl PeekSource for FifoConsumer {
    fn available(&self) -> usize {
        self.bytes_available()
    }

    fn peek_u8(&self, offset: usize) -> u8 {
        self.shared
            .slot(self.read.wrapping_add(offset as u32))
            .load(Ordering::Relaxed)
    }
}
