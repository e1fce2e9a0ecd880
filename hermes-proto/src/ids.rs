use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// A Realm in the teacher sense becomes a Session here: a single, coherent
// distributed run composed of a set of Brokers, each of which has a unique
// BrokerId, each owning a set of Nodes with broker-unique NodeIds.
string_id!(BrokerId);
string_id!(NodeId);
string_id!(StreamId);
string_id!(DeviceId);

/// `node_id` is unique per broker; globally unique when prefixed by the
/// owning broker's id (spec §3, Node descriptor).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct GlobalNodeId {
    pub broker_id: BrokerId,
    pub node_id: NodeId,
}

impl fmt::Display for GlobalNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.broker_id, self.node_id)
    }
}
