// Peer-broker snapshot. Written only by the Broker thread, read by other
// threads via cloned snapshots published at state transitions (spec §5,
// "Shared-resource discipline").

use hermes_proto::{BrokerDescriptor, BrokerId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: BTreeMap<BrokerId, BrokerDescriptor>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: BrokerDescriptor) {
        self.peers.insert(descriptor.broker_id.clone(), descriptor);
    }

    pub fn get(&self, id: &BrokerId) -> Option<&BrokerDescriptor> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &BrokerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clock_eligible_ids(&self) -> Vec<BrokerId> {
        self.peers
            .values()
            .filter(|d| d.is_clock_reference)
            .map(|d| d.broker_id.clone())
            .collect()
    }

    /// Publish a read-only snapshot. Cheap: callers clone an `Arc`, not the
    /// whole map.
    pub fn snapshot(&self) -> Arc<BTreeMap<BrokerId, BrokerDescriptor>> {
        Arc::new(self.peers.clone())
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
    fn insert_and_get_roundtrips() {
        let mut table = PeerTable::new();
        table.insert(descriptor("a"));
        assert!(table.contains(&BrokerId::from("a")));
        assert_eq!(table.len(), 1);
    }
}
