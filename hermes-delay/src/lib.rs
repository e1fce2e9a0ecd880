// Per-stream propagation-delay correction, applied on the Producer side at
// ingress (spec §4.4). The hook is a pure function: deterministic, no side
// effects, callable from the producer worker thread with nothing but the
// sample metadata it's given.

use hermes_proto::{Nanos, StreamId};

/// Metadata available to a delay estimator at the moment a sample is
/// ingested, before it's stamped with `reference_ts`.
#[derive(Debug, Clone, Copy)]
pub struct SampleMetadata {
    pub device_ts: Option<i64>,
    pub host_arrival_ts: Nanos,
}

/// `delay_estimate(stream_id, sample_metadata) -> ns` (spec §4.4). Must be
/// pure: calling it twice with the same arguments yields the same
/// correction (spec §8, invariant 8).
pub trait DelayEstimator: Send + Sync {
    fn estimate_ns(&self, stream_id: &StreamId, metadata: &SampleMetadata) -> Nanos;
}

/// Default estimator: no correction. `reference_ts` equals arrival time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroDelay;

impl DelayEstimator for ZeroDelay {
    fn estimate_ns(&self, _stream_id: &StreamId, _metadata: &SampleMetadata) -> Nanos {
        0
    }
}

/// A fixed per-stream correction, useful for sensors with a known, constant
/// transport latency (spec §4.4's "constant... transport latency" case).
#[derive(Debug, Clone, Copy)]
pub struct ConstantDelay(pub Nanos);

impl DelayEstimator for ConstantDelay {
    fn estimate_ns(&self, _stream_id: &StreamId, _metadata: &SampleMetadata) -> Nanos {
        self.0
    }
}

/// Config-driven estimator selection (the `hermes` binary's glue layer)
/// only knows the estimator's name at runtime, so it builds a `Box<dyn
/// DelayEstimator>`; the generic hot path stays monomorphized for every
/// caller who has a concrete static type, same as with the Node role
/// traits in `hermes-node`.
impl DelayEstimator for Box<dyn DelayEstimator> {
    fn estimate_ns(&self, stream_id: &StreamId, metadata: &SampleMetadata) -> Nanos {
        (**self).estimate_ns(stream_id, metadata)
    }
}

/// Apply an estimator to compute a sample's corrected `reference_ts`
/// (spec §4.2: `reference_ts = reference_time() - delay_estimate(stream)`).
/// Generic rather than `dyn`: this runs on the producer's hot ingest path
/// (spec §4.4), so the estimator call monomorphizes instead of allocating.
pub fn corrected_reference_ts<D: DelayEstimator>(
    estimator: &D,
    stream_id: &StreamId,
    metadata: &SampleMetadata,
    reference_time_ns: Nanos,
) -> Nanos {
    reference_time_ns - estimator.estimate_ns(stream_id, metadata)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_delay_applies_no_correction() {
        let meta = SampleMetadata {
            device_ts: None,
            host_arrival_ts: 1_000,
        };
        let stream = StreamId::from("imu0");
        assert_eq!(
            corrected_reference_ts(&ZeroDelay, &stream, &meta, 1_000),
            1_000
        );
    }

    #[test]
    fn constant_delay_subtracts_fixed_correction() {
        let meta = SampleMetadata {
            device_ts: None,
            host_arrival_ts: 1_000,
        };
        let stream = StreamId::from("imu0");
        let estimator = ConstantDelay(50);
        assert_eq!(corrected_reference_ts(&estimator, &stream, &meta, 1_000), 950);
    }

    #[test]
    fn estimator_is_pure_across_repeated_calls() {
        let meta = SampleMetadata {
            device_ts: Some(42),
            host_arrival_ts: 2_000,
        };
        let stream = StreamId::from("cam0");
        let estimator = ConstantDelay(10);
        let a = estimator.estimate_ns(&stream, &meta);
        let b = estimator.estimate_ns(&stream, &meta);
        assert_eq!(a, b);
    }
}
