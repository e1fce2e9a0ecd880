//! Single-host recording engine (spec §4.3): one ring buffer per stream,
//! a cooperative flush scheduler, a tabular container for scalar/structured
//! samples, a video side-car for frame streams, and a `redb`-backed
//! checkpoint store recording flush progress per stream.

mod checkpoint;
mod container;
mod ioutil;
mod scheduler;
mod video;

pub use checkpoint::CheckpointStore;
pub use container::{Row, SessionMetadata, TabularContainer};
pub use ioutil::AppendWriter;
pub use scheduler::{BufferedSample, FlushScheduler, OverflowSignal, StreamBuffer};
pub use video::{IndexEntry, VideoSidecar};

pub use hermes_base::Ring;
