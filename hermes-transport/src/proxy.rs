// The Broker's pub/sub proxy: every message published locally reaches (a)
// every local subscriber and (b) every configured peer broker; every
// message received from a peer is re-published on the local bus (spec
// §4.1, "Pub/sub proxy contract").

use crate::local_bus::LocalBus;
use crate::peer_link::{PeerPublisher, PeerSubscriber};
use hermes_base::Error;
use hermes_proto::Envelope;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct PubSubProxy {
    local: LocalBus,
    publisher: Option<PeerPublisher>,
}

impl PubSubProxy {
    pub fn new(local: LocalBus) -> Self {
        PubSubProxy {
            local,
            publisher: None,
        }
    }

    pub fn local_bus(&self) -> &LocalBus {
        &self.local
    }

    /// Bind this host's outbound PUB socket; every peer's SUB connects here.
    pub fn set_publisher(&mut self, publisher: PeerPublisher) {
        self.publisher = Some(publisher);
    }

    /// Fan out one locally-published envelope to local subscribers and to
    /// every connected peer (spec §4.1).
    pub async fn publish_local(&mut self, env: Envelope) -> Result<(), Error> {
        self.local.publish(env.clone());
        if let Some(publisher) = &mut self.publisher {
            publisher.publish(&env).await?;
        }
        Ok(())
    }

    /// Spawn a background relay that republishes everything received from
    /// one peer onto the local bus, until `cancel` fires. One call per
    /// configured peer (spec §4.1: "Inbound traffic from peers is
    /// re-published on the local proxy").
    pub fn spawn_peer_relay(
        &self,
        mut sub: PeerSubscriber,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let local = self.local.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = sub.recv() => match res {
                        Ok(env) => local.publish(env),
                        Err(e) => {
                            // Sessions are single-shot (spec §4.1): a lost
                            // peer is logged and this relay exits rather
                            // than reconnecting (E5).
                            tracing::warn!(error = %e, "peer relay ended, peer unreachable");
                            break;
                        }
                    },
                }
            }
        })
    }
}
