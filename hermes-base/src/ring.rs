// Single-producer/single-consumer ring buffer with atomic head/tail only, no
// locks on the fast path (spec §5, "Shared-resource discipline"). `head` and
// `tail` are monotonically increasing logical positions, not indices modulo
// capacity, so "full" and "empty" are never ambiguous: `head - tail` is the
// occupancy and the invariant `head - tail <= capacity` (spec §3, Storage
// buffer) holds by construction — `push` refuses once it would not.
//
// Grounded on the single-slot atomic-sequence SPSC design used for shared
// memory links in the pack's robotics example (cache-line-padded atomic
// counters, producer overwrites nothing, consumer tracks what it's read),
// generalized here from a single slot to a ring of `capacity` slots.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingOverflow;

impl fmt::Display for RingOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring buffer overflow")
    }
}
impl std::error::Error for RingOverflow {}

struct Slot<T>(UnsafeCell<MaybeUninit<T>>);

// SAFETY: access to each slot is serialized by the head/tail protocol below:
// only the producer writes slot `head % capacity` before publishing `head`,
// and only the consumer reads/drops a slot after observing it via `head` and
// before advancing `tail` past it.
unsafe impl<T: Send> Sync for Slot<T> {}

pub struct Ring<T> {
    buf: Box<[Slot<T>]>,
    capacity: usize,
    high_water: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl<T> Ring<T> {
    /// `high_water` is the occupancy at which Storage's backpressure policy
    /// (spec §4.3) should raise its flush frequency; it may equal `capacity`
    /// to disable early warning.
    pub fn new(capacity: usize, high_water: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        let buf = (0..capacity)
            .map(|_| Slot(UnsafeCell::new(MaybeUninit::uninit())))
            .collect();
        Ring {
            buf,
            capacity,
            high_water,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer-only. One sample at a time, never blocks: an overflow is
    /// surfaced to the caller rather than silently dropped (spec §3).
    pub fn push(&self, val: T) -> Result<(), RingOverflow> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head - tail >= self.capacity {
            return Err(RingOverflow);
        }
        let idx = head % self.capacity;
        // SAFETY: slot `idx` is not readable by the consumer until `head` is
        // published below, and no other producer exists (SPSC).
        unsafe {
            (*self.buf[idx].0.get()).write(val);
        }
        self.head.store(head + 1, Ordering::Release);
        Ok(())
    }

    /// Consumer-only. Offers up to `max` unread positions as a contiguous
    /// `[start, start + len)` range for a flush task to serialize (spec
    /// §4.3: "A flush task claims a contiguous tail range").
    pub fn claim(&self, max: usize) -> Option<(usize, usize)> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let avail = head - tail;
        if avail == 0 {
            return None;
        }
        Some((tail, avail.min(max)))
    }

    /// Consumer-only. Borrow the sample at logical position `pos`, which
    /// must lie within a range previously returned by [`Ring::claim`] and
    /// not yet advanced past.
    pub fn read_at(&self, pos: usize) -> &T {
        let idx = pos % self.capacity;
        // SAFETY: `pos` was returned by `claim`, so it is within
        // `[tail, head)` and was written by `push` before `head` advanced
        // past it; the consumer has not yet advanced `tail` past it either.
        unsafe { (*self.buf[idx].0.get()).assume_init_ref() }
    }

    /// Consumer-only. Advances `tail` past a claimed `[from, from + count)`
    /// range via compare-and-set, per spec §4.3. Fails only if a conflicting
    /// advance already happened, which cannot occur under the
    /// single-consumer discipline this type assumes but is checked anyway.
    pub fn advance(&self, from: usize, count: usize) -> Result<(), RingOverflow> {
        self.tail
            .compare_exchange(from, from + count, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| RingOverflow)
    }

    /// Snapshot occupancy, sampled each Storage wake (spec §4.3).
    pub fn occupancy(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head - tail
    }

    pub fn high_water_crossed(&self) -> bool {
        self.occupancy() >= self.high_water
    }

    pub fn is_overflowed(&self) -> bool {
        self.occupancy() > self.capacity
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let tail = *self.tail.get_mut();
        let head = *self.head.get_mut();
        for pos in tail..head {
            let idx = pos % self.capacity;
            // SAFETY: every position in `[tail, head)` was written and never
            // dropped.
            unsafe {
                (*self.buf[idx].0.get()).assume_init_drop();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_claim_roundtrip() {
        let ring: Ring<u32> = Ring::new(4, 4);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        let (start, len) = ring.claim(10).unwrap();
        assert_eq!(start, 0);
        assert_eq!(len, 2);
        assert_eq!(*ring.read_at(0), 1);
        assert_eq!(*ring.read_at(1), 2);
        ring.advance(start, len).unwrap();
        assert_eq!(ring.occupancy(), 0);
    }

    #[test]
    fn exactly_at_capacity_succeeds() {
        let ring: Ring<u32> = Ring::new(4, 4);
        for i in 0..4 {
            ring.push(i).unwrap();
        }
        assert_eq!(ring.occupancy(), 4);
    }

    #[test]
    fn one_beyond_capacity_overflows() {
        let ring: Ring<u32> = Ring::new(4, 4);
        for i in 0..4 {
            ring.push(i).unwrap();
        }
        assert_eq!(ring.push(4), Err(RingOverflow));
    }

    #[test]
    fn high_water_mark() {
        let ring: Ring<u32> = Ring::new(10, 5);
        for i in 0..4 {
            ring.push(i).unwrap();
        }
        assert!(!ring.high_water_crossed());
        ring.push(4).unwrap();
        assert!(ring.high_water_crossed());
    }

    #[test]
    fn wraps_after_advance() {
        let ring: Ring<u32> = Ring::new(2, 2);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        let (start, len) = ring.claim(2).unwrap();
        ring.advance(start, len).unwrap();
        ring.push(3).unwrap();
        ring.push(4).unwrap();
        let (start, len) = ring.claim(2).unwrap();
        assert_eq!(*ring.read_at(start), 3);
        assert_eq!(*ring.read_at(start + 1), 4);
        assert_eq!(len, 2);
    }
}
