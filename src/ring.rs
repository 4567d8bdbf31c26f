//! A bounded single-producer/single-consumer byte ring buffer.
//!
//! Modeled on the `jack_ringbuffer_t` usage throughout the bridge: the
//! producer always checks `write_space()` before writing and drops the
//! message on overflow rather than blocking, and the realtime consumer
//! never allocates. Capacity is rounded up to the next power of two so
//! the head/tail indices can wrap with a mask instead of a modulo.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wait-free SPSC byte ring buffer.
///
/// Safety: at most one thread may call the `write*` methods and at most
/// one (possibly different) thread may call the `read*`/`peek` methods
/// at any given time. Concurrent writers, or concurrent readers, are
/// undefined behavior; the concurrent writer-vs-reader case is the
/// supported one.
pub struct RingFifo {
    buf: UnsafeCell<Box<[u8]>>,
    mask: usize,
    head: AtomicUsize, // next index to read
    tail: AtomicUsize, // next index to write
}

// SAFETY: access to `buf` is disjoint between the single producer (which
// only ever writes into the region between `tail` and `head + capacity`)
// and the single consumer (which only ever reads the region between
// `head` and `tail`), so the two threads never touch the same byte.
unsafe impl Send for RingFifo {}
unsafe impl Sync for RingFifo {}

impl RingFifo {
    /// Create a ring buffer able to hold at least `capacity` bytes.
    /// The actual capacity is rounded up to the next power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        RingFifo {
            buf: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Bytes available to write without overwriting unread data.
    pub fn write_space(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        self.capacity() - (tail.wrapping_sub(head))
    }

    /// Bytes available to read.
    pub fn read_space(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// Write `data` in full, or not at all. Returns `false` if there was
    /// not enough room; the caller is expected to have already checked
    /// `write_space()` and to log the drop itself.
    pub fn write(&self, data: &[u8]) -> bool {
        if data.len() > self.write_space() {
            return false;
        }
        let tail = self.tail.load(Ordering::Relaxed);
        // SAFETY: the consumer never touches bytes ahead of `tail`.
        let buf = unsafe { &mut *self.buf.get() };
        let cap = self.capacity();
        for (i, b) in data.iter().enumerate() {
            buf[(tail.wrapping_add(i)) & self.mask] = *b;
        }
        let _ = cap;
        self.tail.store(tail.wrapping_add(data.len()), Ordering::Release);
        true
    }

    /// Copy up to `buf.len()` readable bytes into `buf` without
    /// advancing the read position. Returns the number of bytes copied.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let avail = self.read_space().min(out.len());
        // SAFETY: the producer never touches bytes behind `head`.
        let src = unsafe { &*self.buf.get() };
        for (i, slot) in out.iter_mut().take(avail).enumerate() {
            *slot = src[(head.wrapping_add(i)) & self.mask];
        }
        avail
    }

    /// Advance the read position by `n` bytes without copying. `n` must
    /// not exceed `read_space()`.
    pub fn read_advance(&self, n: usize) {
        debug_assert!(n <= self.read_space());
        let head = self.head.load(Ordering::Relaxed);
        self.head.store(head.wrapping_add(n), Ordering::Release);
    }

    /// Peek `buf.len()` bytes and advance past them in one call.
    /// Returns the number of bytes actually copied (may be less than
    /// `buf.len()` if fewer bytes are available, in which case the read
    /// position only advances by that amount).
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let n = self.peek(buf);
        self.read_advance(n);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_capacity_up_to_power_of_two() {
        let r = RingFifo::new(10);
        assert_eq!(r.write_space(), 16);
    }

    #[test]
    fn write_then_read_round_trips() {
        let r = RingFifo::new(8);
        assert!(r.write(&[1, 2, 3]));
        assert_eq!(r.read_space(), 3);
        let mut out = [0u8; 3];
        assert_eq!(r.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(r.read_space(), 0);
    }

    #[test]
    fn write_fails_all_or_nothing_on_overflow() {
        let r = RingFifo::new(4);
        assert!(!r.write(&[1, 2, 3, 4, 5]));
        assert_eq!(r.read_space(), 0);
    }

    #[test]
    fn peek_does_not_advance() {
        let r = RingFifo::new(8);
        r.write(&[9, 8, 7]);
        let mut out = [0u8; 3];
        assert_eq!(r.peek(&mut out), 3);
        assert_eq!(r.read_space(), 3);
        r.read_advance(3);
        assert_eq!(r.read_space(), 0);
    }

    #[test]
    fn wraps_around_correctly() {
        let r = RingFifo::new(4);
        assert!(r.write(&[1, 2, 3]));
        let mut out = [0u8; 2];
        r.read(&mut out);
        assert!(r.write(&[4, 5]));
        let mut rest = [0u8; 3];
        assert_eq!(r.read(&mut rest), 3);
        assert_eq!(rest, [3, 4, 5]);
    }

    #[test]
    fn concurrent_producer_and_consumer_preserve_order() {
        use std::sync::Arc;
        let ring = Arc::new(RingFifo::new(64));
        let producer = ring.clone();
        let writer = std::thread::spawn(move || {
            for i in 0u8..200 {
                loop {
                    if producer.write_space() >= 1 {
                        producer.write(&[i]);
                        break;
                    }
                    std::thread::yield_now();
                }
            }
        });
        let mut received = Vec::new();
        while received.len() < 200 {
            let mut byte = [0u8; 1];
            if ring.read(&mut byte) == 1 {
                received.push(byte[0]);
            } else {
                std::thread::yield_now();
            }
        }
        writer.join().unwrap();
        assert_eq!(received, (0u8..200).collect::<Vec<_>>());
    }

    /// Fuzzes a burst of randomly-sized writes against a small ring,
    /// some of which are expected to overflow and get dropped. Checks
    /// that every write either copies its data faithfully in full, or
    /// is rejected outright and leaves the ring untouched -- never a
    /// partial, corrupting write.
    #[test]
    fn random_sized_burst_never_partially_writes() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xa2j_5eed);
        let r = RingFifo::new(64);
        let mut expected = Vec::new();

        for _ in 0..500 {
            let len = rng.gen_range(1..=40);
            let chunk: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let space_before = r.write_space();
            let accepted = r.write(&chunk);
            assert_eq!(accepted, chunk.len() <= space_before);
            if accepted {
                expected.extend_from_slice(&chunk);
            }

            // Drain whatever is available between writes, same as a
            // realtime consumer would each cycle.
            let mut drained = vec![0u8; r.read_space()];
            let n = r.read(&mut drained);
            assert_eq!(n, drained.len());
            assert_eq!(&drained[..n], &expected[..n]);
            expected.drain(..n);
        }
    }
}
