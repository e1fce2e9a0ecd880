// Control-plane wire protocol (spec §6): length-prefixed typed messages,
// each carrying `{sender_id, monotonic_ns, payload}`.

use crate::clock::Nanos;
use crate::ids::{BrokerId, GlobalNodeId};
use serde::{Deserialize, Serialize};

/// One message kind per spec §6's list, plus the payload each carries.
/// Coordination between a Broker and its Nodes, and between peer Brokers,
/// both use this same envelope (spec §4.1, §4.2: "a single request/reply
/// socket").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MsgKind {
    /// Broker-to-peer-broker: announce self during `DISCOVER`.
    Announce(AnnouncePayload),
    /// Reference-broker-to-peer: this broker's origin, during `SYNC`.
    SyncProbe,
    SyncReply { reference_origin_ns: Nanos },
    /// Carries the id this broker believes won election, so a peer that
    /// disagrees (split configuration, spec §4.1) can detect it.
    SyncOk { elected: BrokerId },
    /// Broker-to-Node: transition to READY / RUNNING.
    Ready,
    Start { started_at_reference_ns: Nanos },
    /// Broker-to-Node or peer-to-peer: begin draining.
    Drain,
    /// Broker-to-Node: prepare (open device/socket, self-test).
    Prepare,
    Stop,
    Abort,
    /// Node-to-Broker: unsolicited status push.
    Status(StatusPayload),
    Error(ErrorPayload),
    /// Broker-to-Node (or peer-to-peer): one operator keyboard line,
    /// re-published for Nodes that live in a separate process (spec §4.5).
    Keyboard(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnouncePayload {
    pub broker_id: BrokerId,
    pub clock_eligible: bool,
    pub control_endpoint: String,
    pub data_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub sender_id: GlobalNodeId,
    pub monotonic_ns: Nanos,
    pub sequence: u64,
    /// Set on a reply so the requester can pair it with its request, the
    /// same way the teacher's `submerge-net::Msg::response` flag does.
    pub response: bool,
    pub kind: MsgKind,
}

impl Msg {
    pub fn request(sender_id: GlobalNodeId, monotonic_ns: Nanos, sequence: u64, kind: MsgKind) -> Self {
        Msg {
            sender_id,
            monotonic_ns,
            sequence,
            response: false,
            kind,
        }
    }

    pub fn reply(&self, sender_id: GlobalNodeId, monotonic_ns: Nanos, kind: MsgKind) -> Self {
        Msg {
            sender_id,
            monotonic_ns,
            sequence: self.sequence,
            response: true,
            kind,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, hermes_base::Error> {
        rmp_serde::to_vec(self).map_err(hermes_base::Error::from)
    }

    pub fn decode(buf: &[u8]) -> Result<Msg, hermes_base::Error> {
        rmp_serde::from_slice(buf).map_err(hermes_base::Error::from)
    }
}
