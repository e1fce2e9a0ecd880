// The single configuration object the core is parameterized by (spec §6).
// This crate owns validation and the config digest; parsing a config file's
// schema into this struct is an external collaborator's job (spec §1).

use hermes_base::{err_kind, Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HermesConfig {
    pub broker_id: String,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    pub clock_eligible: bool,
    pub nodes: Vec<NodeConfig>,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub broker_id: String,
    pub control_endpoint: String,
    pub data_endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Producer,
    Consumer,
    Pipeline,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub role: NodeRole,
    /// Vendor SDK binding name; the binding itself is out of scope (spec
    /// §1), this core only carries the selector string through.
    pub driver: String,
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub params: std::collections::BTreeMap<String, String>,
    /// Per-stream delay-estimator driver selection (spec §6, optional).
    #[serde(default)]
    pub delay_estimator: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub stream_id: String,
    pub device_id: String,
    pub nominal_rate_hz: f64,
    #[serde(default)]
    pub is_burst: bool,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub channel_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
    pub flush_hz: f64,
    pub high_water: usize,
    pub drain_deadline_ms: u64,
    #[serde(default)]
    pub video_codec: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub discover_timeout_ms: u64,
    pub sync_timeout_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

impl HermesConfig {
    /// Topology and node-spec validation run at `BOOT` (spec §4.1, §7:
    /// "Configuration error — invalid or inconsistent topology/Node spec;
    /// detected at BOOT; fatal").
    pub fn validate(&self) -> Result<(), Error> {
        if self.broker_id.is_empty() {
            return Err(err_kind(ErrorKind::Configuration, "broker_id must not be empty"));
        }

        let mut seen_nodes = BTreeSet::new();
        for node in &self.nodes {
            if !seen_nodes.insert(node.node_id.clone()) {
                return Err(err_kind(
                    ErrorKind::Configuration,
                    format!("duplicate node_id: {}", node.node_id),
                ));
            }
            if node.streams.is_empty() {
                return Err(err_kind(
                    ErrorKind::Configuration,
                    format!("node {} declares no streams", node.node_id),
                ));
            }
        }

        let mut seen_peers = BTreeSet::new();
        for peer in &self.peers {
            if peer.broker_id == self.broker_id {
                return Err(err_kind(
                    ErrorKind::Configuration,
                    "a broker cannot list itself as a peer",
                ));
            }
            if !seen_peers.insert(peer.broker_id.clone()) {
                return Err(err_kind(
                    ErrorKind::Configuration,
                    format!("duplicate peer broker_id: {}", peer.broker_id),
                ));
            }
        }

        if self.storage.flush_hz <= 0.0 {
            return Err(err_kind(ErrorKind::Configuration, "storage.flush_hz must be positive"));
        }

        Ok(())
    }

    /// Lowest lexicographic `broker_id` among clock-eligible brokers wins
    /// (spec §4.1, SYNC election). Includes `self` in the comparison.
    pub fn is_clock_reference(&self, clock_eligible_peer_ids: &[String]) -> bool {
        if !self.clock_eligible {
            return false;
        }
        clock_eligible_peer_ids
            .iter()
            .all(|id| self.broker_id <= *id)
    }
}
