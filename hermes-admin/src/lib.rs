mod config;
mod digest;
mod logging;
mod metrics;

pub use config::{
    ExperimentConfig, HermesConfig, NodeConfig, NodeRole, PeerConfig, StorageConfig, StreamConfig,
    SyncConfig,
};
pub use digest::config_digest;
pub use logging::init_logging;
pub use metrics::{TransportMetrics, TransportMetricsSnapshot};
