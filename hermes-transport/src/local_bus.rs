// Intra-host transport: every local publisher's samples reach every local
// subscriber (Consumers, Pipelines, Storage) through one process-wide
// broadcast bus, with no socket in between (spec §2, §4.1).

use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::Envelope;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Envelope>,
}

impl LocalBus {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// observing `RecvError::Lagged` (surfaced here as a sequence-gap-style
    /// transport error, per spec §7: "subscribers that need a merged
    /// ordering sort by reference_ts within a bounded reorder window" — this
    /// is that window's backing bound).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        LocalBus { tx }
    }

    /// Forward `env` to every current local subscriber. Never blocks: a
    /// broadcast send with no receivers, or with a receiver that can't keep
    /// up, never stalls the publisher (spec §4.3, "Producers are never
    /// blocked").
    pub fn publish(&self, env: Envelope) {
        let _ = self.tx.send(env);
    }

    pub fn subscribe(&self) -> LocalSubscription {
        LocalSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct LocalSubscription {
    rx: broadcast::Receiver<Envelope>,
}

impl LocalSubscription {
    pub async fn recv(&mut self) -> Result<Envelope, Error> {
        match self.rx.recv().await {
            Ok(env) => Ok(env),
            Err(broadcast::error::RecvError::Closed) => {
                Err(err_kind(ErrorKind::Transport, "local bus closed"))
            }
            Err(broadcast::error::RecvError::Lagged(n)) => Err(err_kind(
                ErrorKind::Transport,
                format!("local bus subscriber lagged by {n} messages"),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hermes_proto::GlobalNodeId;

    fn env(seq: u64) -> Envelope {
        Envelope::new(
            "topic",
            GlobalNodeId {
                broker_id: "b".into(),
                node_id: "n".into(),
            },
            seq,
            0,
            vec![],
        )
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_message_once() {
        let bus = LocalBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(env(1));
        bus.publish(env(2));
        assert_eq!(a.recv().await.unwrap().seq, 1);
        assert_eq!(a.recv().await.unwrap().seq, 2);
        assert_eq!(b.recv().await.unwrap().seq, 1);
        assert_eq!(b.recv().await.unwrap().seq, 2);
    }
}
