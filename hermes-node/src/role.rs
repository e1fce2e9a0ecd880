// Role-specific data contracts on top of the Node FSM base (spec §4.2).
// Vendor SDK bindings are out of scope (spec §1); these traits are the thin
// interface the core consumes, implemented by an external collaborator per
// device. Methods are synchronous: production work runs on a dedicated
// worker thread, never on the coordination reply path (spec §4.2, "Producers
// must not block their Broker coordination reply path").

use hermes_base::Error;
use hermes_delay::SampleMetadata;
use hermes_proto::{Nanos, Payload, StreamId};

/// Wire-level samples carry raw `payload_bytes` (spec §6's data-plane
/// envelope has no payload-kind tag); a driver decodes them against the
/// stream schema it was configured with (tabular vs. video) rather than
/// the core guessing on its behalf.

/// A Producer acquires its device in `INIT`, self-tests on `PREPARE`, then
/// repeatedly reads one sample per call once `START`ed.
pub trait ProducerDriver: Send {
    /// Acquire the external device. Failure here surfaces `ERROR` (spec
    /// §4.2); the Broker's policy decides degrade vs. fail-host.
    fn open(&mut self) -> Result<(), Error>;

    /// Short self-test run once, after `open` and before the production
    /// loop starts.
    fn self_test(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Block for the next sample. Returning `Ok(None)` means "no sample
    /// available within this call, try again" rather than end-of-stream.
    fn read(&mut self) -> Result<Option<(StreamId, SampleMetadata, Payload)>, Error>;

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// A Consumer's per-sample callback must be non-blocking relative to its own
/// reply channel (spec §4.2).
pub trait ConsumerDriver: Send {
    fn on_sample(
        &mut self,
        stream_id: &StreamId,
        reference_ts_ns: Nanos,
        payload_bytes: &[u8],
    ) -> Result<(), Error>;
}

/// A Pipeline runs two logically independent workers that share only
/// ownership-disjoint outbound streams (spec §4.2): a synchronous ingest
/// side reacting to input, and an asynchronous generator side producing
/// internally-triggered output.
pub trait PipelineIngest: Send {
    fn on_sample(
        &mut self,
        stream_id: &StreamId,
        reference_ts_ns: Nanos,
        payload_bytes: &[u8],
    ) -> Result<Option<(StreamId, Payload)>, Error>;
}

pub trait PipelineGenerator: Send {
    fn generate(&mut self) -> Result<Option<(StreamId, SampleMetadata, Payload)>, Error>;
}

// Config-driven driver selection (the `hermes` binary's glue layer) only
// knows a driver's name at runtime, so it builds `Box<dyn ...>` trait
// objects; these let a boxed driver stand in wherever the Node types are
// generic over a concrete driver.
impl ProducerDriver for Box<dyn ProducerDriver> {
    fn open(&mut self) -> Result<(), Error> {
        (**self).open()
    }

    fn self_test(&mut self) -> Result<(), Error> {
        (**self).self_test()
    }

    fn read(&mut self) -> Result<Option<(StreamId, SampleMetadata, Payload)>, Error> {
        (**self).read()
    }

    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }
}

impl ConsumerDriver for Box<dyn ConsumerDriver> {
    fn on_sample(&mut self, stream_id: &StreamId, reference_ts_ns: Nanos, payload_bytes: &[u8]) -> Result<(), Error> {
        (**self).on_sample(stream_id, reference_ts_ns, payload_bytes)
    }
}

impl PipelineIngest for Box<dyn PipelineIngest> {
    fn on_sample(
        &mut self,
        stream_id: &StreamId,
        reference_ts_ns: Nanos,
        payload_bytes: &[u8],
    ) -> Result<Option<(StreamId, Payload)>, Error> {
        (**self).on_sample(stream_id, reference_ts_ns, payload_bytes)
    }
}

impl PipelineGenerator for Box<dyn PipelineGenerator> {
    fn generate(&mut self) -> Result<Option<(StreamId, SampleMetadata, Payload)>, Error> {
        (**self).generate()
    }
}
