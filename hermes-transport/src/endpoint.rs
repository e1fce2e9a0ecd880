use std::fmt;

/// A control- or data-plane endpoint. Only TCP is implemented: intra-host
/// traffic uses [`crate::local_bus::LocalBus`] instead of a socket at all
/// (spec §2: "local in-memory transport"), and inter-host traffic always
/// crosses a real network, so every socket this crate opens is a TCP socket
/// bound to a host/port pair (spec §2: "inter-host (via TCP message
/// sockets)").
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    pub fn zmq_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
