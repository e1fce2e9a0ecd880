// Consumer worker (spec §4.2): subscribes to a configured topic set and
// applies a non-blocking callback to each arriving sample.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use hermes_admin::TransportMetrics;
use hermes_base::{err_kind, Diagnostic, DiagnosticKind, Error, ErrorKind};
use hermes_proto::{ErrorPayload, GlobalNodeId, Msg, MsgKind, SequenceCounter, StatusPayload, StreamId};
use hermes_transport::{CoordinationClient, LocalSubscription};

use crate::role::ConsumerDriver;
use crate::state::NodeState;

pub struct ConsumerNode<C: ConsumerDriver + 'static> {
    node_id: GlobalNodeId,
    driver: C,
    control: CoordinationClient,
    subscription: LocalSubscription,
    seq: SequenceCounter,
    state: NodeState,
    metrics: Arc<TransportMetrics>,
    last_seq: HashMap<GlobalNodeId, u64>,
}

impl<C: ConsumerDriver + 'static> ConsumerNode<C> {
    pub fn new(
        node_id: GlobalNodeId,
        driver: C,
        control: CoordinationClient,
        subscription: LocalSubscription,
    ) -> Self {
        ConsumerNode {
            node_id,
            driver,
            control,
            subscription,
            seq: SequenceCounter::new(),
            state: NodeState::Init,
            metrics: Arc::new(TransportMetrics::new()),
            last_seq: HashMap::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Per-transport counters for this Node (spec §7: "logged and counted
    /// per stream"); an admin process can poll this alongside the Broker's.
    pub fn metrics(&self) -> Arc<TransportMetrics> {
        self.metrics.clone()
    }

    async fn send_status(&mut self, detail: impl Into<String>) -> Result<(), Error> {
        let msg = Msg::request(
            self.node_id.clone(),
            0,
            self.seq.next(),
            MsgKind::Status(StatusPayload { detail: detail.into() }),
        );
        self.control.send(&msg).await
    }

    async fn send_error(&mut self, message: impl Into<String>) -> Result<(), Error> {
        let msg = Msg::request(
            self.node_id.clone(),
            0,
            self.seq.next(),
            MsgKind::Error(ErrorPayload { message: message.into() }),
        );
        self.control.send(&msg).await
    }

    /// Drive `INIT -> READY -> RUNNING -> DRAINING -> DONE`/`ERROR` (spec
    /// §4.2's Consumer lifecycle: no device to open, so `INIT -> READY` is
    /// immediate).
    pub async fn run(mut self) -> Result<(), Error> {
        self.state = NodeState::Ready;
        info!(target: "hermes::node", node_id = %self.node_id, "INIT -> READY");
        self.send_status("registered").await?;

        loop {
            match self.control.recv().await?.kind {
                MsgKind::Prepare => self.send_status("ready").await?,
                MsgKind::Start { .. } => break,
                MsgKind::Abort => {
                    self.state = NodeState::Error;
                    return Err(err_kind(ErrorKind::Fatal, "aborted before start"));
                }
                _ => continue,
            }
        }

        self.state = NodeState::Running;
        info!(target: "hermes::node", node_id = %self.node_id, "READY -> RUNNING");

        loop {
            tokio::select! {
                biased;
                msg = self.control.recv() => {
                    match msg?.kind {
                        MsgKind::Stop | MsgKind::Drain => break,
                        MsgKind::Abort => {
                            self.state = NodeState::Error;
                            return Err(err_kind(ErrorKind::Fatal, "aborted mid-run"));
                        }
                        _ => continue,
                    }
                }
                env = self.subscription.recv() => {
                    match env {
                        Ok(env) => {
                            self.metrics.record_received();
                            if let Some((expected, got)) =
                                crate::seq_gap::detect_gap(self.last_seq.get(&env.publisher_id).copied(), env.seq)
                            {
                                self.metrics.record_sequence_gap();
                                let diag = Diagnostic::for_stream(
                                    env.topic.clone(),
                                    DiagnosticKind::SequenceGap { expected, got },
                                );
                                warn!(
                                    target: "hermes::node", node_id = %self.node_id, stream = %env.topic,
                                    expected, got, kind = ?diag.kind, "sequence gap detected"
                                );
                            }
                            self.last_seq.insert(env.publisher_id.clone(), env.seq);

                            if let Err(e) = self.driver.on_sample(
                                &StreamId::from(env.topic.as_str()),
                                env.reference_ts_ns,
                                &env.payload_bytes,
                            ) {
                                warn!(target: "hermes::node", node_id = %self.node_id, error = %e, "consumer callback failed");
                            }
                        }
                        Err(e) => {
                            self.metrics.record_recv_failure();
                            let diag = Diagnostic::for_node(self.node_id.to_string(), DiagnosticKind::TransportHiccup);
                            warn!(target: "hermes::node", node_id = %self.node_id, error = %e, kind = ?diag.kind, "consumer transport hiccup");
                        }
                    }
                }
            }
        }

        self.state = NodeState::Draining;
        self.state = NodeState::Done;
        info!(target: "hermes::node", node_id = %self.node_id, "RUNNING -> DONE");
        Ok(())
    }
}
