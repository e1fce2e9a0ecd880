mod clock;
mod coordination;
mod envelope;
mod ids;
mod model;
mod msg;

pub use clock::{compute_offset, Nanos, ReferenceClock};
pub use coordination::{Pairing, Received};
pub use envelope::{Envelope, SequenceCounter};
pub use ids::{BrokerId, DeviceId, GlobalNodeId, NodeId, StreamId};
pub use model::{
    BrokerDescriptor, NodeAddressing, NodeDescriptor, Payload, Role, Sample, Session, StreamSchema,
};
pub use msg::{AnnouncePayload, ErrorPayload, Msg, MsgKind, StatusPayload};
