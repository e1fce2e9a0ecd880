//! Process-supervision glue (spec §2's "Glue" component, 5%): turns a
//! validated [`HermesConfig`] into running Node and Storage tasks wired to
//! a booted [`Broker`]'s control endpoint and local bus.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use hermes_admin::{HermesConfig, NodeConfig, NodeRole};
use hermes_base::Error;
use hermes_delay::{ConstantDelay, DelayEstimator, ZeroDelay};
use hermes_node::{ConsumerNode, PipelineNode, ProducerNode};
use hermes_proto::{BrokerId, GlobalNodeId, NodeId, ReferenceClock, StreamId};
use hermes_storage::{CheckpointStore, FlushScheduler, SessionMetadata, StreamBuffer, TabularContainer, VideoSidecar};
use hermes_transport::{CoordinationClient, Endpoint, LocalBus};

use crate::drivers::{LoggingConsumer, NoGenerator, PassthroughPipeline, SyntheticProducer};

/// Every spawned Node/Storage task, so `hermes::run` can await them after
/// the Broker reaches a terminal state.
pub struct RunningTasks {
    pub handles: Vec<JoinHandle<()>>,
}

fn build_delay(selector: &Option<String>) -> Box<dyn DelayEstimator> {
    match selector.as_deref() {
        Some(s) if s.starts_with("constant:") => {
            let ns: i64 = s["constant:".len()..].parse().unwrap_or(0);
            Box::new(ConstantDelay(ns))
        }
        _ => Box::new(ZeroDelay),
    }
}

/// Spawn one task per configured Node, connecting each to the Broker's
/// control endpoint and local bus (spec §4.2: Nodes hold only the Broker's
/// coordination endpoint, never an owning handle back to it).
pub async fn spawn_nodes(
    config: &HermesConfig,
    self_broker_id: &BrokerId,
    control_endpoint: &Endpoint,
    bus: &LocalBus,
    clock: &Arc<ReferenceClock>,
) -> Result<RunningTasks, Error> {
    let mut handles = Vec::new();
    for node in &config.nodes {
        let handle = spawn_one_node(node, self_broker_id, control_endpoint, bus, clock).await?;
        handles.push(handle);
    }
    Ok(RunningTasks { handles })
}

async fn spawn_one_node(
    node: &NodeConfig,
    self_broker_id: &BrokerId,
    control_endpoint: &Endpoint,
    bus: &LocalBus,
    clock: &Arc<ReferenceClock>,
) -> Result<JoinHandle<()>, Error> {
    let node_id = GlobalNodeId {
        broker_id: self_broker_id.clone(),
        node_id: NodeId::from(node.node_id.as_str()),
    };
    let control = CoordinationClient::connect(control_endpoint).await?;

    match node.role {
        NodeRole::Producer => {
            let streams = node
                .streams
                .iter()
                .map(|s| (StreamId::from(s.stream_id.as_str()), s.nominal_rate_hz))
                .collect();
            let channels = node
                .streams
                .first()
                .map(|s| s.channel_names.len().max(1))
                .unwrap_or(1);
            let driver: Box<dyn hermes_node::ProducerDriver> = Box::new(SyntheticProducer::new(streams, channels));
            let delay = build_delay(&node.delay_estimator);
            let first_stream = node
                .streams
                .first()
                .map(|s| StreamId::from(s.stream_id.as_str()))
                .unwrap_or_else(|| StreamId::from("unknown"));
            let producer =
                ProducerNode::new(node_id.clone(), first_stream, driver, delay, control, bus.clone(), clock.clone());
            Ok(tokio::spawn(async move {
                if let Err(e) = producer.run().await {
                    warn!(target: "hermes::glue", node_id = %node_id, error = %e, "producer node ended with error");
                }
            }))
        }
        NodeRole::Consumer => {
            let driver: Box<dyn hermes_node::ConsumerDriver> = Box::new(LoggingConsumer::new(node.node_id.clone()));
            let consumer = ConsumerNode::new(node_id.clone(), driver, control, bus.subscribe());
            Ok(tokio::spawn(async move {
                if let Err(e) = consumer.run().await {
                    warn!(target: "hermes::glue", node_id = %node_id, error = %e, "consumer node ended with error");
                }
            }))
        }
        NodeRole::Pipeline => {
            let output_stream = node
                .streams
                .first()
                .map(|s| StreamId::from(s.stream_id.as_str()))
                .unwrap_or_else(|| StreamId::from("unknown"));
            let ingest: Box<dyn hermes_node::PipelineIngest> = Box::new(PassthroughPipeline::new(output_stream));
            let generator: Box<dyn hermes_node::PipelineGenerator> = Box::new(NoGenerator);
            let pipeline = PipelineNode::new(node_id.clone(), ingest, generator, control, bus.subscribe(), bus.clone());
            Ok(tokio::spawn(async move {
                if let Err(e) = pipeline.run().await {
                    warn!(target: "hermes::glue", node_id = %node_id, error = %e, "pipeline node ended with error");
                }
            }))
        }
    }
}

/// The buffers and ingest tasks [`spawn_stream_ingest`] started, handed to
/// [`spawn_flush_scheduler`] once the real session-start timestamp is known.
pub struct StreamIngest {
    pub buffers: Vec<Arc<StreamBuffer>>,
    pub ingest_handles: Vec<JoinHandle<()>>,
    /// The first ring overflow observed across any stream, if any (spec §6:
    /// overflow is a distinct exit code from a clean operator-requested
    /// stop, even though both reach DRAIN through the same `cancel` token).
    pub overflow: Arc<std::sync::Mutex<Option<Error>>>,
}

/// Phase one of storage start-up (spec §4.3): subscribe to the bus and
/// start buffering every configured stream into memory right away, before
/// the Broker has reached RUN and computed `started_at_reference_ns`. The
/// in-memory ring doesn't care that the on-disk container doesn't exist
/// yet, so no sample is lost waiting for that timestamp.
pub fn spawn_stream_ingest(config: &HermesConfig, bus: &LocalBus, cancel: CancellationToken) -> StreamIngest {
    let mut buffers = Vec::new();
    let mut ingest_handles = Vec::new();
    let overflow = Arc::new(std::sync::Mutex::new(None));
    for node in &config.nodes {
        for s in &node.streams {
            let buffer = Arc::new(StreamBuffer::new(
                NodeId::from(node.node_id.as_str()),
                StreamId::from(s.stream_id.as_str()),
                s.is_video,
                config.storage.high_water * 4,
                config.storage.high_water,
            ));
            let (overflow_tx, mut overflow_rx) = tokio::sync::mpsc::channel(1);
            let sub = bus.subscribe();
            let ingest_buffer = buffer.clone();
            ingest_handles.push(tokio::spawn(ingest_buffer.ingest(sub, overflow_tx)));
            let stream_cancel = cancel.clone();
            let overflow_seen = overflow.clone();
            tokio::spawn(async move {
                if let Some(e) = overflow_rx.recv().await {
                    warn!(target: "hermes::glue", error = %e, "storage ring overflow, initiating DRAIN");
                    *overflow_seen.lock().expect("overflow mutex poisoned") = Some(e);
                    stream_cancel.cancel();
                }
            });
            buffers.push(buffer);
        }
    }
    StreamIngest { buffers, ingest_handles, overflow }
}

/// Phase two (spec §4.3, §6): build the session's [`TabularContainer`]/
/// [`CheckpointStore`] with the real `started_at_reference_ns`, register a
/// [`VideoSidecar`] for every video stream, and spawn the [`FlushScheduler`]
/// over the buffers phase one already started filling.
pub async fn spawn_flush_scheduler(
    config: &HermesConfig,
    self_broker_id: &BrokerId,
    session_id: String,
    started_at_reference_ns: i64,
    ingest: StreamIngest,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, Error> {
    let streams: Vec<hermes_proto::StreamSchema> = config
        .nodes
        .iter()
        .flat_map(|node| {
            node.streams.iter().map(move |s| hermes_proto::StreamSchema {
                stream_id: StreamId::from(s.stream_id.as_str()),
                device_id: hermes_proto::DeviceId::from(s.device_id.as_str()),
                node_id: NodeId::from(node.node_id.as_str()),
                nominal_rate_hz: s.nominal_rate_hz,
                is_burst: s.is_burst,
                is_video: s.is_video,
                channel_names: s.channel_names.clone(),
            })
        })
        .collect();

    let metadata = SessionMetadata {
        session_id,
        started_at_reference_ns,
        host_id: whoami_host(),
        broker_id: self_broker_id.to_string(),
        config_digest: hermes_admin::config_digest(config)?,
        streams: streams.clone(),
    };

    let container = TabularContainer::create(&config.storage.root_dir, &metadata)?;
    let checkpoints = CheckpointStore::open(
        std::path::Path::new(&config.storage.root_dir).join("checkpoints.redb"),
    )?;

    let buffers = ingest.buffers.clone();
    let mut scheduler = FlushScheduler::new(container, checkpoints, ingest.buffers, config.storage.flush_hz);
    for schema in streams.iter().filter(|s| s.is_video) {
        let video_root = std::path::Path::new(&config.storage.root_dir)
            .join("video")
            .join(schema.node_id.to_string());
        let sidecar = VideoSidecar::create(&video_root, schema.stream_id.as_ref())?;
        scheduler.register_video(schema.stream_id.clone(), sidecar);
    }

    let ingest_handles = ingest.ingest_handles;
    Ok(tokio::spawn(async move {
        if let Err(e) = scheduler.run(cancel).await {
            warn!(target: "hermes::glue", error = %e, "storage scheduler ended with error");
        }
        // DRAIN's final flush only claims one bounded range per stream
        // (spec §4.3); a backlog larger than that is reported, not silently
        // lost (spec §8, invariant 5 and E4's "diagnostic reporting ~N
        // unflushed samples").
        let unflushed: usize = buffers.iter().map(|b| b.ring.occupancy()).sum();
        if unflushed > 0 {
            let diag = hermes_base::Diagnostic::for_node("storage", hermes_base::DiagnosticKind::DrainTimeout {
                unflushed: unflushed as u64,
            });
            warn!(target: "hermes::glue", unflushed, kind = ?diag.kind, "DRAIN deadline reached with samples still unflushed");
        }
        for handle in ingest_handles {
            let _ = handle.await;
        }
    }))
}

fn whoami_host() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
