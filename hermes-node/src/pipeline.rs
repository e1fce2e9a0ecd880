// Pipeline worker (spec §4.2): a synchronous ingest half and an
// asynchronous generator half, run as two independent tasks sharing no
// state beyond their own outbound streams (spec §4.2: "no cross-worker
// locks are required").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use hermes_admin::TransportMetrics;
use hermes_base::{err_kind, Diagnostic, DiagnosticKind, Error, ErrorKind};
use hermes_proto::{Envelope, GlobalNodeId, Msg, MsgKind, SequenceCounter, StatusPayload, StreamId};
use hermes_transport::{CoordinationClient, LocalBus, LocalSubscription};

use crate::role::{PipelineGenerator, PipelineIngest};
use crate::state::NodeState;

pub struct PipelineNode<I: PipelineIngest + 'static, G: PipelineGenerator + 'static> {
    node_id: GlobalNodeId,
    ingest: I,
    generator: G,
    control: CoordinationClient,
    subscription: LocalSubscription,
    bus: LocalBus,
    seq: SequenceCounter,
    state: NodeState,
    metrics: Arc<TransportMetrics>,
    last_seq: HashMap<GlobalNodeId, u64>,
}

impl<I: PipelineIngest + 'static, G: PipelineGenerator + 'static> PipelineNode<I, G> {
    pub fn new(
        node_id: GlobalNodeId,
        ingest: I,
        generator: G,
        control: CoordinationClient,
        subscription: LocalSubscription,
        bus: LocalBus,
    ) -> Self {
        PipelineNode {
            node_id,
            ingest,
            generator,
            control,
            subscription,
            bus,
            seq: SequenceCounter::new(),
            state: NodeState::Init,
            metrics: Arc::new(TransportMetrics::new()),
            last_seq: HashMap::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

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

        let stop = Arc::new(AtomicBool::new(false));
        let generator_task = tokio::spawn(run_generator(
            self.node_id.clone(),
            self.generator,
            self.bus.clone(),
            self.seq,
            stop.clone(),
        ));

        let result = loop {
            tokio::select! {
                biased;
                msg = self.control.recv() => {
                    match msg?.kind {
                        MsgKind::Stop | MsgKind::Drain => break Ok(()),
                        MsgKind::Abort => break Err(err_kind(ErrorKind::Fatal, "aborted mid-run")),
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

                            let stream_id = StreamId::from(env.topic.as_str());
                            match self.ingest.on_sample(&stream_id, env.reference_ts_ns, &env.payload_bytes) {
                                Ok(Some((out_stream, payload))) => {
                                    let bytes = encode_payload(&payload);
                                    let out = Envelope::new(
                                        out_stream.as_ref(),
                                        self.node_id.clone(),
                                        0,
                                        env.reference_ts_ns,
                                        bytes,
                                    );
                                    self.bus.publish(out);
                                }
                                Ok(None) => {}
                                Err(e) => warn!(target: "hermes::node", node_id = %self.node_id, error = %e, "pipeline ingest callback failed"),
                            }
                        }
                        Err(e) => {
                            self.metrics.record_recv_failure();
                            let diag = Diagnostic::for_node(self.node_id.to_string(), DiagnosticKind::TransportHiccup);
                            warn!(target: "hermes::node", node_id = %self.node_id, error = %e, kind = ?diag.kind, "pipeline ingest transport hiccup");
                        }
                    }
                }
            }
        };

        stop.store(true, Ordering::Relaxed);
        let _ = generator_task.await;

        self.state = NodeState::Draining;
        self.state = NodeState::Done;
        info!(target: "hermes::node", node_id = %self.node_id, "RUNNING -> DONE");
        if let Err(e) = result {
            self.state = NodeState::Error;
            return Err(e);
        }
        Ok(())
    }
}

async fn run_generator<G: PipelineGenerator>(
    node_id: GlobalNodeId,
    mut generator: G,
    bus: LocalBus,
    seq: SequenceCounter,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match generator.generate() {
            Ok(Some((stream_id, metadata, payload))) => {
                let bytes = encode_payload(&payload);
                let env = Envelope::new(
                    stream_id.as_ref(),
                    node_id.clone(),
                    seq.next(),
                    metadata.host_arrival_ts,
                    bytes,
                );
                bus.publish(env);
            }
            Ok(None) => tokio::task::yield_now().await,
            Err(e) => warn!(target: "hermes::node", node_id = %node_id, error = %e, "pipeline generator transport hiccup"),
        }
    }
}

fn encode_payload(payload: &hermes_proto::Payload) -> Vec<u8> {
    match payload {
        hermes_proto::Payload::Tabular(values) => rmp_serde::to_vec(values).unwrap_or_default(),
        hermes_proto::Payload::Frame(bytes) => bytes.clone(),
    }
}
