// Data model (spec §3): Sample, Stream, Node descriptor, Broker descriptor,
// Session.

use crate::clock::Nanos;
use crate::ids::{BrokerId, DeviceId, NodeId, StreamId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Producer,
    Consumer,
    Pipeline,
}

/// Either a tabular fixed-shape tensor or an opaque binary frame
/// (video/image), per spec §3's Sample payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Tabular(Vec<f64>),
    Frame(Vec<u8>),
}

/// A single timestamped record on one stream (spec §3). `device_ts` is an
/// opaque secondary timestamp carried through as another channel, not
/// interpreted by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub stream_id: StreamId,
    pub host_arrival_ts: Nanos,
    pub device_ts: Option<i64>,
    pub payload: Payload,
}

/// A typed channel (spec §3). Burst streams deliver N samples with a single
/// timestamp and require interpolation on read; that interpolation is a
/// consumer-side concern this core does not prescribe (spec §9, open
/// question (b), generalized).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamSchema {
    pub stream_id: StreamId,
    pub device_id: DeviceId,
    pub node_id: NodeId,
    pub nominal_rate_hz: f64,
    pub is_burst: bool,
    pub is_video: bool,
    pub channel_names: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeAddressing {
    pub control_endpoint: String,
    pub data_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_id: NodeId,
    pub role: Role,
    pub input_streams: Vec<StreamId>,
    pub output_streams: Vec<StreamId>,
    pub addressing: NodeAddressing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerDescriptor {
    pub broker_id: BrokerId,
    pub control_endpoint: String,
    pub data_endpoint: String,
    pub local_nodes: Vec<NodeId>,
    pub peer_brokers: Vec<BrokerId>,
    pub is_clock_reference: bool,
}

/// Created once at `RUN` entry, immutable thereafter (spec §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started_at_reference_ns: Nanos,
    pub participating_brokers: Vec<BrokerId>,
    pub streams: Vec<StreamSchema>,
}
