// SYNC phase (spec §4.1): elect the reference broker, compute this broker's
// clock offset relative to it, then barrier on every peer's SYNC_OK before
// leaving the state (spec §8, invariant 4).

use crate::deadline::Deadline;
use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::{compute_offset, BrokerId, Nanos};
use std::collections::BTreeSet;

/// Lowest lexicographic `broker_id` among clock-eligible brokers wins. The
/// broker itself must be included in `candidates` by the caller if it is
/// clock-eligible.
pub fn elect_reference(candidates: &BTreeSet<BrokerId>) -> Result<BrokerId, Error> {
    candidates
        .iter()
        .min()
        .cloned()
        .ok_or_else(|| err_kind(ErrorKind::Sync, "no clock-eligible broker configured"))
}

/// `None` means this process. Two brokers concurrently believing themselves
/// to be the elected reference (split configuration) is the caller's cue
/// to transition both to `FAILED` (spec §4.1 tie-break).
pub fn reference_is_self(elected: &BrokerId, self_id: &BrokerId) -> bool {
    elected == self_id
}

/// Non-reference brokers compute `offset_ns` from a single probe/reply
/// round trip (spec §4.1). `probe_sent_local_ns` and `reply_received_local_ns`
/// are this process's own monotonic clock readings around the exchange;
/// `reference_origin_ns` is carried in the reference broker's `SYNC_REPLY`.
pub fn offset_from_exchange(
    probe_sent_local_ns: i64,
    reply_received_local_ns: i64,
    reference_origin_ns: Nanos,
) -> Nanos {
    compute_offset(probe_sent_local_ns, reply_received_local_ns, reference_origin_ns)
}

/// Tracks which configured peers have acknowledged `SYNC_OK`; no broker
/// leaves `SYNC` until every peer has, or the deadline has fully elapsed.
pub struct SyncBarrier {
    expected: BTreeSet<BrokerId>,
    acked: BTreeSet<BrokerId>,
    deadline: Deadline,
}

pub enum SyncOutcome {
    Pending,
    AllAcked,
    TimedOut,
}

impl SyncBarrier {
    pub fn new(expected: impl IntoIterator<Item = BrokerId>, timeout_ms: u64) -> Self {
        SyncBarrier {
            expected: expected.into_iter().collect(),
            acked: BTreeSet::new(),
            deadline: Deadline::from_millis(timeout_ms),
        }
    }

    pub fn on_sync_ok(&mut self, from: BrokerId) {
        if self.expected.contains(&from) {
            self.acked.insert(from);
        }
    }

    pub fn poll(&self) -> SyncOutcome {
        if self.acked == self.expected {
            SyncOutcome::AllAcked
        } else if self.deadline.is_expired() {
            SyncOutcome::TimedOut
        } else {
            SyncOutcome::Pending
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lowest_id_wins_election() {
        let candidates: BTreeSet<BrokerId> =
            [BrokerId::from("b"), BrokerId::from("a"), BrokerId::from("c")].into();
        assert_eq!(elect_reference(&candidates).unwrap(), BrokerId::from("a"));
    }

    #[test]
    fn empty_candidates_is_a_sync_error() {
        assert!(elect_reference(&BTreeSet::new()).is_err());
    }

    #[test]
    fn barrier_waits_for_every_expected_peer() {
        let mut barrier = SyncBarrier::new([BrokerId::from("a"), BrokerId::from("b")], 60_000);
        barrier.on_sync_ok(BrokerId::from("a"));
        assert!(matches!(barrier.poll(), SyncOutcome::Pending));
        barrier.on_sync_ok(BrokerId::from("b"));
        assert!(matches!(barrier.poll(), SyncOutcome::AllAcked));
    }

    #[tokio::test]
    async fn barrier_times_out_without_full_ack() {
        let mut barrier = SyncBarrier::new([BrokerId::from("a"), BrokerId::from("b")], 0);
        barrier.on_sync_ok(BrokerId::from("a"));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(matches!(barrier.poll(), SyncOutcome::TimedOut));
    }
}
