// Producer worker (spec §4.2). Device reads run on a dedicated OS thread so
// a blocking vendor SDK call can never stall the Broker coordination reply
// path; that thread hands samples to the async driver over a channel.

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{info, warn};

use hermes_admin::TransportMetrics;
use hermes_base::{err_kind, Diagnostic, DiagnosticKind, Error, ErrorKind};
use hermes_delay::{corrected_reference_ts, DelayEstimator, SampleMetadata};
use hermes_proto::{
    Envelope, ErrorPayload, GlobalNodeId, Msg, MsgKind, Payload, ReferenceClock, SequenceCounter, StatusPayload,
    StreamId,
};
use hermes_transport::{CoordinationClient, LocalBus};

use crate::role::ProducerDriver;
use crate::state::NodeState;

const SAMPLE_CHANNEL_DEPTH: usize = 256;

pub struct ProducerNode<D: ProducerDriver + 'static, E: DelayEstimator + 'static> {
    node_id: GlobalNodeId,
    stream_id: StreamId,
    driver: D,
    delay: E,
    control: CoordinationClient,
    bus: LocalBus,
    clock: Arc<ReferenceClock>,
    seq: SequenceCounter,
    state: NodeState,
    metrics: Arc<TransportMetrics>,
}

impl<D: ProducerDriver + 'static, E: DelayEstimator + 'static> ProducerNode<D, E> {
    pub fn new(
        node_id: GlobalNodeId,
        stream_id: StreamId,
        driver: D,
        delay: E,
        control: CoordinationClient,
        bus: LocalBus,
        clock: Arc<ReferenceClock>,
    ) -> Self {
        ProducerNode {
            node_id,
            stream_id,
            driver,
            delay,
            control,
            bus,
            clock,
            seq: SequenceCounter::new(),
            state: NodeState::Init,
            metrics: Arc::new(TransportMetrics::new()),
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

    async fn send_error(&mut self, message: impl Into<String>) -> Result<(), Error> {
        let msg = Msg::request(
            self.node_id.clone(),
            0,
            self.seq.next(),
            MsgKind::Error(ErrorPayload { message: message.into() }),
        );
        self.control.send(&msg).await
    }

    /// Drive `INIT -> READY -> RUNNING -> DRAINING -> DONE`/`ERROR` to
    /// completion, per spec §4.2's Producer lifecycle.
    pub async fn run(mut self) -> Result<(), Error> {
        if let Err(e) = self.driver.open() {
            self.state = NodeState::Error;
            let _ = self.send_error(format!("device open failed: {e}")).await;
            return Err(e);
        }
        self.state = NodeState::Ready;
        info!(target: "hermes::node", node_id = %self.node_id, "INIT -> READY");
        self.send_status("registered").await?;

        loop {
            match self.control.recv().await?.kind {
                MsgKind::Prepare => {
                    if let Err(e) = self.driver.self_test() {
                        self.state = NodeState::Error;
                        let _ = self.send_error(format!("self-test failed: {e}")).await;
                        return Err(e);
                    }
                    self.send_status("ready").await?;
                }
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

        let (tx, mut rx) = mpsc::channel(SAMPLE_CHANNEL_DEPTH);
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let worker_stop = stop.clone();
        let mut driver = self.driver;
        let worker = thread::spawn(move || {
            while !worker_stop.load(std::sync::atomic::Ordering::Relaxed) {
                match driver.read() {
                    Ok(Some(sample)) => {
                        if tx.blocking_send(Ok(sample)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        if tx.blocking_send(Err(e)).is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = driver.close();
            driver
        });

        loop {
            tokio::select! {
                biased;
                msg = self.control.recv() => {
                    match msg?.kind {
                        MsgKind::Stop | MsgKind::Drain => break,
                        MsgKind::Abort => {
                            stop.store(true, std::sync::atomic::Ordering::Relaxed);
                            let _ = worker.join();
                            self.state = NodeState::Error;
                            return Err(err_kind(ErrorKind::Fatal, "aborted mid-run"));
                        }
                        _ => continue,
                    }
                }
                event = rx.recv() => {
                    match event {
                        Some(Ok((stream_id, metadata, payload))) => {
                            self.metrics.record_sent();
                            let reference_ts_ns = corrected_reference_ts(
                                &self.delay,
                                &stream_id,
                                &metadata,
                                self.clock.reference_time(),
                            );
                            let env = Envelope::new(
                                stream_id.as_ref(),
                                self.node_id.clone(),
                                self.seq.next(),
                                reference_ts_ns,
                                payload_bytes(&payload),
                            );
                            self.bus.publish(env);
                        }
                        Some(Err(e)) => {
                            self.metrics.record_send_failure();
                            let diag = Diagnostic::for_stream(self.stream_id.to_string(), DiagnosticKind::TransportHiccup);
                            warn!(target: "hermes::node", node_id = %self.node_id, error = %e, kind = ?diag.kind, "producer transport hiccup");
                        }
                        None => break,
                    }
                }
            }
        }

        self.state = NodeState::Draining;
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = worker.join();
        self.state = NodeState::Done;
        info!(target: "hermes::node", node_id = %self.node_id, "RUNNING -> DONE");
        Ok(())
    }
}

fn payload_bytes(payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::Tabular(values) => rmp_serde::to_vec(values).unwrap_or_default(),
        Payload::Frame(bytes) => bytes.clone(),
    }
}
