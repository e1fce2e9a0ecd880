// The reference clock (spec §3, §4.1). Every process keeps a single scalar
// `offset_ns` such that `reference_time = local_monotonic_time + offset_ns`.
// After `SYNC` completes, every process's `offset_ns` agrees to within the
// configured tolerance (spec §8, invariant 3).

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Nanoseconds, relative to an arbitrary but fixed local monotonic origin.
pub type Nanos = i64;

/// A process-wide reference clock. `offset_ns` is written exactly once, at
/// the end of `SYNC` (spec §4.1), and read on every producer's hot path, so
/// it is a single atomic rather than anything lock-based.
#[derive(Debug)]
pub struct ReferenceClock {
    origin: Instant,
    offset_ns: AtomicI64,
}

impl ReferenceClock {
    /// A clock with `offset_ns == 0`, i.e. `reference_time() ==
    /// local_monotonic_time()`. This is what the reference broker itself
    /// runs with; non-reference brokers call [`ReferenceClock::set_offset`]
    /// once SYNC resolves their offset.
    pub fn unsynced() -> Self {
        ReferenceClock {
            origin: Instant::now(),
            offset_ns: AtomicI64::new(0),
        }
    }

    pub fn offset_ns(&self) -> Nanos {
        self.offset_ns.load(Ordering::Acquire)
    }

    /// Set once, at the end of `SYNC` (spec §4.1: "non-reference brokers
    /// compute offset_ns ... barrier: no broker leaves SYNC until all peers
    /// have acknowledged").
    pub fn set_offset(&self, offset_ns: Nanos) {
        self.offset_ns.store(offset_ns, Ordering::Release);
    }

    fn local_monotonic_ns(&self) -> Nanos {
        self.origin.elapsed().as_nanos() as Nanos
    }

    /// `reference_time = local_monotonic_time + offset_ns` (spec §3).
    pub fn reference_time(&self) -> Nanos {
        self.local_monotonic_ns() + self.offset_ns()
    }
}

/// A single symmetric round-trip `SYNC_PROBE`/`SYNC_REPLY` exchange (spec
/// §4.1: "single exchange; PTP handles finer alignment beneath this
/// layer"). `probe_sent_local_ns` and `reply_received_local_ns` are the
/// requester's own monotonic timestamps; `reference_origin_ns` is the
/// reference broker's `reference_time()` value at the instant it answered.
pub fn compute_offset(
    probe_sent_local_ns: Nanos,
    reply_received_local_ns: Nanos,
    reference_origin_ns: Nanos,
) -> Nanos {
    let round_trip = reply_received_local_ns - probe_sent_local_ns;
    let local_at_reference_instant = probe_sent_local_ns + round_trip / 2;
    reference_origin_ns - local_at_reference_instant
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_offset_when_symmetric_and_equal() {
        // Reference broker answered at the same instant the requester's
        // round trip midpoint lands on.
        let offset = compute_offset(1_000, 1_200, 1_100);
        assert_eq!(offset, 0);
    }

    #[test]
    fn offset_tracks_reference_ahead() {
        let offset = compute_offset(1_000, 1_200, 2_100);
        assert_eq!(offset, 1_000);
    }
}
