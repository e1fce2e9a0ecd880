// Data-plane wire protocol (spec §6): `{topic, publisher_id, seq,
// reference_ts_ns, payload_len, payload_bytes}`.

use crate::clock::Nanos;
use crate::ids::GlobalNodeId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub publisher_id: GlobalNodeId,
    pub seq: u64,
    pub reference_ts_ns: Nanos,
    pub payload_len: u32,
    pub payload_bytes: Vec<u8>,
}

impl Envelope {
    pub fn new(
        topic: impl Into<String>,
        publisher_id: GlobalNodeId,
        seq: u64,
        reference_ts_ns: Nanos,
        payload_bytes: Vec<u8>,
    ) -> Self {
        Envelope {
            topic: topic.into(),
            publisher_id,
            seq,
            reference_ts_ns,
            payload_len: payload_bytes.len() as u32,
            payload_bytes,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, hermes_base::Error> {
        rmp_serde::to_vec(self).map_err(hermes_base::Error::from)
    }

    pub fn decode(buf: &[u8]) -> Result<Envelope, hermes_base::Error> {
        rmp_serde::from_slice(buf).map_err(hermes_base::Error::from)
    }
}

/// Per-`(publisher_id, stream_id)` monotonically increasing sequence
/// generator (spec §4.1 pub/sub contract; spec §8 invariant 2). Each
/// producer owns one of these per output stream.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        SequenceCounter(AtomicU64::new(0))
    }

    /// Returns the sequence number to stamp on the next sample, then
    /// advances.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sequence_counter_is_strictly_monotonic() {
        let c = SequenceCounter::new();
        let a = c.next();
        let b = c.next();
        assert!(b > a);
    }
}
