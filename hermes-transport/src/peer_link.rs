// Inter-host data plane: one PUB socket per Broker, bound once, that every
// peer's SUB socket connects to (spec §2, §4.1). Pure PUB/SUB rather than
// XPUB/XSUB since this crate, like the pack's closest analogue, has no use
// for subscriber-count feedback.

use crate::endpoint::Endpoint;
use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::Envelope;
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

pub struct PeerPublisher {
    sock: PubSocket,
}

impl PeerPublisher {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, Error> {
        let mut sock = PubSocket::new();
        sock.bind(&endpoint.zmq_endpoint())
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("bind {endpoint}: {e}")))?;
        Ok(PeerPublisher { sock })
    }

    pub async fn publish(&mut self, env: &Envelope) -> Result<(), Error> {
        let bytes = env.encode()?;
        let msg = ZmqMessage::from(bytes);
        self.sock
            .send(msg)
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("publish: {e}")))
    }
}

pub struct PeerSubscriber {
    sock: SubSocket,
    peer: Endpoint,
}

impl PeerSubscriber {
    pub async fn connect(peer: &Endpoint) -> Result<Self, Error> {
        let mut sock = SubSocket::new();
        sock.connect(&peer.zmq_endpoint())
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("connect {peer}: {e}")))?;
        // Subscribe to every topic: per-topic filtering happens at the
        // Broker's proxy and at each Node, not on the wire (spec §4.1).
        sock.subscribe("")
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("subscribe {peer}: {e}")))?;
        Ok(PeerSubscriber {
            sock,
            peer: peer.clone(),
        })
    }

    pub async fn recv(&mut self) -> Result<Envelope, Error> {
        let msg = self
            .sock
            .recv()
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("recv from {}: {e}", self.peer)))?;
        let frame = msg
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| err_kind(ErrorKind::Transport, "empty frame from peer"))?;
        Envelope::decode(&frame)
    }
}
