//! Built-in drivers selected when a Node config's `driver` string names no
//! vendor SDK (spec §1: vendor SDK bindings are an external collaborator's
//! concern). These exist so the framework is runnable end-to-end without
//! real hardware: smoke-testing a topology, and the integration tests in
//! `hermes/tests` that drive scenarios E1–E6.

use std::time::Duration;

use tracing::info;

use hermes_base::Error;
use hermes_delay::SampleMetadata;
use hermes_node::{ConsumerDriver, PipelineGenerator, PipelineIngest, ProducerDriver};
use hermes_proto::{Nanos, Payload, StreamId};

/// Synthesizes one tabular sample per stream at its configured nominal
/// rate. Used when no real sensor binding is configured.
pub struct SyntheticProducer {
    streams: Vec<(StreamId, f64)>,
    index: usize,
    channels: usize,
}

impl SyntheticProducer {
    pub fn new(streams: Vec<(StreamId, f64)>, channels: usize) -> Self {
        SyntheticProducer { streams, index: 0, channels }
    }

    fn now_ns() -> Nanos {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as Nanos)
            .unwrap_or(0)
    }
}

impl ProducerDriver for SyntheticProducer {
    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn read(&mut self) -> Result<Option<(StreamId, SampleMetadata, Payload)>, Error> {
        if self.streams.is_empty() {
            return Ok(None);
        }
        let (stream_id, rate_hz) = &self.streams[self.index % self.streams.len()];
        self.index += 1;
        std::thread::sleep(Duration::from_secs_f64(1.0 / rate_hz.max(1.0)));
        let metadata = SampleMetadata {
            device_ts: None,
            host_arrival_ts: Self::now_ns(),
        };
        Ok(Some((stream_id.clone(), metadata, Payload::Tabular(vec![0.0; self.channels]))))
    }
}

/// Logs every sample it receives; used as the default Consumer when no
/// real sink is configured.
pub struct LoggingConsumer {
    node_id: String,
}

impl LoggingConsumer {
    pub fn new(node_id: impl Into<String>) -> Self {
        LoggingConsumer { node_id: node_id.into() }
    }
}

impl ConsumerDriver for LoggingConsumer {
    fn on_sample(&mut self, stream_id: &StreamId, reference_ts_ns: Nanos, payload_bytes: &[u8]) -> Result<(), Error> {
        info!(
            target: "hermes::drivers",
            node_id = %self.node_id,
            stream_id = %stream_id,
            reference_ts_ns,
            bytes = payload_bytes.len(),
            "sample received"
        );
        Ok(())
    }
}

/// Forwards every ingested sample to a single output stream unmodified.
pub struct PassthroughPipeline {
    output_stream: StreamId,
}

impl PassthroughPipeline {
    pub fn new(output_stream: StreamId) -> Self {
        PassthroughPipeline { output_stream }
    }
}

impl PipelineIngest for PassthroughPipeline {
    fn on_sample(
        &mut self,
        _stream_id: &StreamId,
        _reference_ts_ns: Nanos,
        payload_bytes: &[u8],
    ) -> Result<Option<(StreamId, Payload)>, Error> {
        Ok(Some((self.output_stream.clone(), Payload::Frame(payload_bytes.to_vec()))))
    }
}

/// Never generates on its own; a Pipeline whose only output is
/// ingest-triggered.
pub struct NoGenerator;

impl PipelineGenerator for NoGenerator {
    fn generate(&mut self) -> Result<Option<(StreamId, SampleMetadata, Payload)>, Error> {
        Ok(None)
    }
}
