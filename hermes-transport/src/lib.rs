mod coordination;
mod endpoint;
mod local_bus;
mod peer_link;
mod proxy;

pub use coordination::{CoordinationClient, CoordinationServer};
pub use endpoint::Endpoint;
pub use local_bus::{LocalBus, LocalSubscription};
pub use peer_link::{PeerPublisher, PeerSubscriber};
pub use proxy::PubSubProxy;
