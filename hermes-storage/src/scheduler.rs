// Cooperative flush scheduler (spec §4.3): one ring per stream, woken
// periodically; each wake claims a contiguous tail range via CAS, flushes
// it to the stream's destination (tabular container row or video frame),
// then advances a durable checkpoint. Concurrent streams flush in
// parallel; each has at most one in-flight flusher because each owns its
// `StreamBuffer` exclusively.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hermes_base::{err_kind, Error, ErrorKind, Ring};
use hermes_proto::{NodeId, StreamId};
use hermes_transport::LocalSubscription;

use crate::checkpoint::CheckpointStore;
use crate::container::{Row, TabularContainer};
use crate::video::VideoSidecar;

/// What flows through a stream's ring while it waits to be flushed. Kept
/// small and `Copy`-free but cheap to move: the envelope is already decoded
/// once, at ingest.
pub struct BufferedSample {
    pub reference_ts_ns: i64,
    pub payload_bytes: Vec<u8>,
}

pub struct StreamBuffer {
    pub node_id: NodeId,
    pub stream_id: StreamId,
    pub is_video: bool,
    pub ring: Ring<BufferedSample>,
}

/// Fan the ring's overflow upward (spec §4.3: "Producers are never blocked
/// by Storage; they observe overflow as a dropped-on-write condition the
/// core treats as fatal"). The Broker treats a send on this channel as
/// cause to transition into `DRAIN`.
pub type OverflowSignal = mpsc::Sender<Error>;

impl StreamBuffer {
    pub fn new(node_id: NodeId, stream_id: StreamId, is_video: bool, capacity: usize, high_water: usize) -> Self {
        StreamBuffer {
            node_id,
            stream_id,
            is_video,
            ring: Ring::new(capacity, high_water),
        }
    }

    /// Runs until `subscription` ends or the ring overflows. Overflow is
    /// reported once via `overflow` and then ingestion for this stream
    /// stops; the scheduler's caller is expected to initiate `DRAIN`.
    pub async fn ingest(
        self: Arc<Self>,
        mut subscription: LocalSubscription,
        overflow: OverflowSignal,
    ) {
        loop {
            match subscription.recv().await {
                Ok(env) if env.topic != self.stream_id.as_ref() => continue,
                Ok(env) => {
                    let sample = BufferedSample {
                        reference_ts_ns: env.reference_ts_ns,
                        payload_bytes: env.payload_bytes,
                    };
                    if self.ring.push(sample).is_err() {
                        warn!(target: "hermes::storage", stream_id = %self.stream_id, "ring overflow");
                        let _ = overflow
                            .send(err_kind(
                                ErrorKind::Overflow,
                                format!("stream {} exceeded ring capacity", self.stream_id),
                            ))
                            .await;
                        return;
                    }
                }
                Err(e) => {
                    warn!(target: "hermes::storage", stream_id = %self.stream_id, error = %e, "subscription ended");
                    return;
                }
            }
        }
    }
}

pub struct FlushScheduler {
    container: TabularContainer,
    video: HashMap<StreamId, VideoSidecar>,
    checkpoints: CheckpointStore,
    streams: Vec<Arc<StreamBuffer>>,
    base_wake: Duration,
    fast_wake: Duration,
}

impl FlushScheduler {
    pub fn new(
        container: TabularContainer,
        checkpoints: CheckpointStore,
        streams: Vec<Arc<StreamBuffer>>,
        flush_hz: f64,
    ) -> Self {
        let base_wake = Duration::from_secs_f64(1.0 / flush_hz.max(0.001));
        FlushScheduler {
            container,
            video: HashMap::new(),
            checkpoints,
            streams,
            base_wake,
            fast_wake: base_wake / 4,
        }
    }

    pub fn register_video(&mut self, stream_id: StreamId, sidecar: VideoSidecar) {
        self.video.insert(stream_id, sidecar);
    }

    /// Runs the flush loop until `cancel` fires, then performs one final
    /// flush and fsync (spec §4.3's "DRAIN requires the final flush to
    /// complete").
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), Error> {
        loop {
            let any_hot = self.streams.iter().any(|s| s.ring.high_water_crossed());
            let wake = if any_hot { self.fast_wake } else { self.base_wake };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wake) => self.flush_once()?,
            }
        }
        self.flush_once()?;
        self.container.sync()?;
        for sidecar in self.video.values_mut() {
            sidecar.sync()?;
        }
        Ok(())
    }

    fn flush_once(&mut self) -> Result<(), Error> {
        for stream in &self.streams {
            let Some((start, len)) = stream.ring.claim(4096) else {
                continue;
            };
            for pos in start..start + len {
                let sample = stream.ring.read_at(pos);
                if stream.is_video {
                    if let Some(sidecar) = self.video.get_mut(&stream.stream_id) {
                        sidecar.append_frame(sample.reference_ts_ns, None, &sample.payload_bytes)?;
                    }
                } else {
                    let values: Vec<f64> = rmp_serde::from_slice(&sample.payload_bytes).unwrap_or_default();
                    self.container.append_row(
                        &stream.node_id,
                        &stream.stream_id,
                        &Row { reference_ts_ns: sample.reference_ts_ns, values },
                    )?;
                }
            }
            stream
                .ring
                .advance(start, len)
                .map_err(|_| hermes_base::err_kind(hermes_base::ErrorKind::Fatal, "concurrent flush on one stream"))?;
            let key = format!("{}/{}", stream.node_id, stream.stream_id);
            self.checkpoints.record_flush(&key, (start + len) as u64)?;
        }
        self.container.flush()?;
        info!(target: "hermes::storage", "flush cycle complete");
        Ok(())
    }
}
