// Control plane: the Broker's one coordination socket per locally-owned
// Node (spec §4.1, §4.2). A ROUTER (Broker) / DEALER (Node) pair is used
// rather than strict REQ/REP so that, in addition to Broker-initiated
// `PREPARE`/`START`/`STOP`/`ABORT`, the Node can push unsolicited `STATUS`
// at any time without a pending request — exactly the `Unsolicited` vs
// `Paired` distinction [`hermes_proto::Pairing`] models. This is also what
// makes thread-based and process-isolated Nodes identical from the
// Broker's point of view (spec §9): both are just a DEALER connecting to
// the Broker's ROUTER over TCP.

use crate::endpoint::Endpoint;
use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::Msg;
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

/// Broker-side end of one Node's coordination socket.
pub struct CoordinationServer {
    sock: RouterSocket,
}

impl CoordinationServer {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, Error> {
        let mut sock = RouterSocket::new();
        sock.bind(&endpoint.zmq_endpoint())
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("bind {endpoint}: {e}")))?;
        Ok(CoordinationServer { sock })
    }

    /// Receive the next message from any connected Node, returning the
    /// ROUTER identity frame alongside the decoded [`Msg`] so the reply can
    /// be routed back to the same Node.
    pub async fn recv(&mut self) -> Result<(Vec<u8>, Msg), Error> {
        let zmsg = self
            .sock
            .recv()
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("recv: {e}")))?;
        let frames = zmsg.into_vec();
        let identity = frames
            .first()
            .ok_or_else(|| err_kind(ErrorKind::Transport, "missing ROUTER identity frame"))?
            .to_vec();
        let payload = frames
            .last()
            .ok_or_else(|| err_kind(ErrorKind::Transport, "missing payload frame"))?;
        let msg = Msg::decode(payload)?;
        Ok((identity, msg))
    }

    pub async fn send(&mut self, identity: &[u8], msg: &Msg) -> Result<(), Error> {
        let bytes = msg.encode()?;
        let zmsg: ZmqMessage = vec![identity.to_vec().into(), bytes.into()]
            .try_into()
            .map_err(|_| err_kind(ErrorKind::Transport, "could not build router frame"))?;
        self.sock
            .send(zmsg)
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("send: {e}")))
    }
}

/// Node-side end of the coordination socket.
pub struct CoordinationClient {
    sock: DealerSocket,
}

impl CoordinationClient {
    pub async fn connect(broker: &Endpoint) -> Result<Self, Error> {
        let mut sock = DealerSocket::new();
        sock.connect(&broker.zmq_endpoint())
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("connect {broker}: {e}")))?;
        Ok(CoordinationClient { sock })
    }

    pub async fn send(&mut self, msg: &Msg) -> Result<(), Error> {
        let bytes = msg.encode()?;
        self.sock
            .send(ZmqMessage::from(bytes))
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("send: {e}")))
    }

    pub async fn recv(&mut self) -> Result<Msg, Error> {
        let zmsg = self
            .sock
            .recv()
            .await
            .map_err(|e| err_kind(ErrorKind::Transport, format!("recv: {e}")))?;
        let frame = zmsg
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| err_kind(ErrorKind::Transport, "empty coordination frame"))?;
        Msg::decode(&frame)
    }
}
