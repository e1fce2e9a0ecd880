// DISCOVER quorum bookkeeping (spec §4.1): await all configured peers or a
// timeout, whichever comes first. No early exit before the timeout unless
// every configured peer has announced (spec §8, invariant 4's SYNC analogue
// applies equally here).

use crate::deadline::Deadline;
use hermes_proto::{BrokerDescriptor, BrokerId};
use std::collections::BTreeSet;

pub struct DiscoveryTracker {
    expected: BTreeSet<BrokerId>,
    announced: Vec<BrokerDescriptor>,
    deadline: Deadline,
}

pub enum DiscoveryOutcome {
    Pending,
    Quorum(Vec<BrokerDescriptor>),
    TimedOut,
}

impl DiscoveryTracker {
    pub fn new(expected: impl IntoIterator<Item = BrokerId>, timeout_ms: u64) -> Self {
        DiscoveryTracker {
            expected: expected.into_iter().collect(),
            announced: Vec::new(),
            deadline: Deadline::from_millis(timeout_ms),
        }
    }

    pub fn on_announce(&mut self, descriptor: BrokerDescriptor) {
        if self.expected.contains(&descriptor.broker_id)
            && !self.announced.iter().any(|d| d.broker_id == descriptor.broker_id)
        {
            self.announced.push(descriptor);
        }
    }

    pub fn has_announced(&self, id: &BrokerId) -> bool {
        self.announced.iter().any(|d| &d.broker_id == id)
    }

    pub fn poll(&self) -> DiscoveryOutcome {
        if self.announced.len() == self.expected.len() {
            DiscoveryOutcome::Quorum(self.announced.clone())
        } else if self.deadline.is_expired() {
            DiscoveryOutcome::TimedOut
        } else {
            DiscoveryOutcome::Pending
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn descriptor(id: &str) -> BrokerDescriptor {
        BrokerDescriptor {
            broker_id: BrokerId::from(id),
            control_endpoint: "tcp://127.0.0.1:9000".into(),
            data_endpoint: "tcp://127.0.0.1:9001".into(),
            local_nodes: vec![],
            peer_brokers: vec![],
            is_clock_reference: false,
        }
    }

    #[test]
    fn quorum_reached_once_all_expected_announce() {
        let mut tracker = DiscoveryTracker::new([BrokerId::from("a"), BrokerId::from("b")], 60_000);
        tracker.on_announce(descriptor("a"));
        assert!(matches!(tracker.poll(), DiscoveryOutcome::Pending));
        tracker.on_announce(descriptor("b"));
        assert!(matches!(tracker.poll(), DiscoveryOutcome::Quorum(_)));
    }

    #[test]
    fn unexpected_peer_is_ignored() {
        let mut tracker = DiscoveryTracker::new([BrokerId::from("a")], 60_000);
        tracker.on_announce(descriptor("z"));
        assert!(matches!(tracker.poll(), DiscoveryOutcome::Pending));
    }

    #[test]
    fn times_out_when_quorum_not_reached() {
        let tracker = DiscoveryTracker::new([BrokerId::from("a")], 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(matches!(tracker.poll(), DiscoveryOutcome::TimedOut));
    }
}
