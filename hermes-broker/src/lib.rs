mod broker;
mod deadline;
mod discovery;
mod peer_table;
mod state;
mod sync;

pub use broker::Broker;
pub use deadline::Deadline;
pub use discovery::{DiscoveryOutcome, DiscoveryTracker};
pub use peer_table::PeerTable;
pub use state::{transition, BrokerOutcome, BrokerState};
pub use sync::{elect_reference, offset_from_exchange, reference_is_self, SyncBarrier, SyncOutcome};
