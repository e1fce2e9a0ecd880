mod consumer;
mod pipeline;
mod producer;
mod role;
mod seq_gap;
mod state;

pub use consumer::ConsumerNode;
pub use pipeline::PipelineNode;
pub use producer::ProducerNode;
pub use role::{ConsumerDriver, PipelineGenerator, PipelineIngest, ProducerDriver};
pub use state::NodeState;
