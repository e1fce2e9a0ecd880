// The Broker FSM driver (spec §4.1). Owns its local Nodes, the peer table,
// and the pub/sub proxy; everything else in this crate is bookkeeping this
// loop consults.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hermes_admin::HermesConfig;
use hermes_base::{err_kind, Diagnostic, DiagnosticKind, Error, ErrorKind};
use hermes_proto::{
    AnnouncePayload, BrokerDescriptor, BrokerId, GlobalNodeId, Msg, MsgKind, NodeId, ReferenceClock,
};
use hermes_transport::{CoordinationClient, CoordinationServer, Endpoint, LocalBus, PeerPublisher, PeerSubscriber, PubSubProxy};

use crate::discovery::{DiscoveryOutcome, DiscoveryTracker};
use crate::peer_table::PeerTable;
use crate::state::{BrokerOutcome, BrokerState};
use crate::sync::{elect_reference, offset_from_exchange, reference_is_self, SyncBarrier, SyncOutcome};

pub struct Broker {
    config: HermesConfig,
    self_id: BrokerId,
    control_endpoint: Endpoint,
    data_endpoint: Endpoint,
    state: BrokerState,
    peers: PeerTable,
    proxy: PubSubProxy,
    control: CoordinationServer,
    clock: Arc<ReferenceClock>,
    diagnostics: Vec<Diagnostic>,
    cancel: CancellationToken,
    /// ROUTER identity frame for each locally-owned Node, keyed by its
    /// `node_id`; populated as Nodes register over the same control socket
    /// peer brokers use (spec §4.1).
    local_nodes: BTreeMap<NodeId, Vec<u8>>,
    session_start_tx: Option<oneshot::Sender<i64>>,
}

impl Broker {
    /// `control_endpoint` is this host's coordination (ROUTER) socket;
    /// `data_endpoint` is its outbound pub/sub (PUB) socket (spec §4.1).
    /// `cancel` is the handle an operator-stop or duration-expiry trigger
    /// fires to move `RUN` into `DRAIN` (spec §4.1); the caller owns it so
    /// it can be cancelled from outside the FSM loop.
    pub async fn boot(
        config: HermesConfig,
        control_endpoint: Endpoint,
        data_endpoint: Endpoint,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        config.validate()?;
        let control = CoordinationServer::bind(&control_endpoint).await?;
        let publisher = PeerPublisher::bind(&data_endpoint).await?;
        let self_id = BrokerId::from(config.broker_id.as_str());
        info!(
            target: "hermes::broker", broker_id = %self_id,
            "BOOT: control socket bound at {control_endpoint}, data socket at {data_endpoint}"
        );
        let local_bus_capacity = config.storage.high_water.max(64);
        let mut proxy = PubSubProxy::new(LocalBus::new(local_bus_capacity));
        proxy.set_publisher(publisher);
        Ok(Broker {
            config,
            self_id,
            control_endpoint,
            data_endpoint,
            state: BrokerState::Boot,
            peers: PeerTable::new(),
            proxy,
            control,
            clock: Arc::new(ReferenceClock::unsynced()),
            diagnostics: Vec::new(),
            cancel,
            local_nodes: BTreeMap::new(),
            session_start_tx: None,
        })
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once this broker has computed the real RUN-entry timestamp
    /// (spec §6), so a caller spawning storage concurrently with the FSM
    /// doesn't have to thread a placeholder through `spawn_storage`.
    pub fn take_session_start(&mut self) -> oneshot::Receiver<i64> {
        let (tx, rx) = oneshot::channel();
        self.session_start_tx = Some(tx);
        rx
    }

    /// The process-wide reference clock (spec §3). `reference_time()` only
    /// reflects this broker's offset once `SYNC` has completed.
    pub fn clock(&self) -> Arc<ReferenceClock> {
        self.clock.clone()
    }

    fn self_sender_id(&self) -> GlobalNodeId {
        GlobalNodeId {
            broker_id: self.self_id.clone(),
            node_id: NodeId::from("broker"),
        }
    }

    /// Best-effort one-shot delivery to a peer's control socket: connect,
    /// send, hold the socket open briefly so zeromq has a chance to flush
    /// before the connection drops (spec §4.1's gossip-style `DISCOVER`/
    /// `SYNC` broadcasts have no acknowledgement of their own).
    async fn tell_peer(&self, control_endpoint: &str, kind: MsgKind) {
        let endpoint = match parse_zmq_endpoint(control_endpoint) {
            Some(e) => e,
            None => return,
        };
        let msg = Msg::request(self.self_sender_id(), self.clock.reference_time(), 0, kind);
        match CoordinationClient::connect(&endpoint).await {
            Ok(mut client) => {
                if let Err(e) = client.send(&msg).await {
                    warn!(target: "hermes::broker", peer = %control_endpoint, error = %e, "failed to reach peer");
                }
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            Err(e) => warn!(target: "hermes::broker", peer = %control_endpoint, error = %e, "could not connect to peer"),
        }
    }

    /// Local Nodes carry this broker's own `broker_id` in their
    /// `GlobalNodeId` (a peer broker's `sender_id.broker_id` is its own),
    /// so that plus an explicit `"registered"` status push is enough to
    /// tell a local Node apart from anything else sharing the ROUTER
    /// socket, such as the keyboard republisher (spec §4.1).
    fn note_local_node(&mut self, identity: &[u8], msg: &Msg) {
        if msg.sender_id.broker_id != self.self_id {
            return;
        }
        if let MsgKind::Status(ref payload) = msg.kind {
            if payload.detail == "registered" {
                self.local_nodes.entry(msg.sender_id.node_id.clone()).or_insert_with(|| identity.to_vec());
            }
        }
    }

    /// Block until every Node in `config.nodes` has registered (or the
    /// discover timeout elapses), draining the control socket the same way
    /// `do_discover` does.
    async fn await_local_nodes(&mut self) -> Result<(), Error> {
        let expected: BTreeSet<NodeId> = self.config.nodes.iter().map(|n| NodeId::from(n.node_id.as_str())).collect();
        let deadline = crate::deadline::Deadline::from_millis(self.config.sync.discover_timeout_ms);
        while !expected.iter().all(|n| self.local_nodes.contains_key(n)) {
            if deadline.is_expired() {
                return Err(err_kind(
                    ErrorKind::Discovery,
                    "local node(s) did not register before discover_timeout_ms",
                ));
            }
            let recv = timeout(Duration::from_millis(50), self.control.recv()).await;
            if let Ok(Ok((identity, msg))) = recv {
                self.note_local_node(&identity, &msg);
            }
        }
        Ok(())
    }

    /// Send `kind` to every registered local Node (spec §4.1: "Broker
    /// commands each local Node"); best-effort per node, like `tell_peer`.
    async fn command_local_nodes(&mut self, kind: MsgKind) {
        let targets: Vec<(NodeId, Vec<u8>)> =
            self.local_nodes.iter().map(|(id, identity)| (id.clone(), identity.clone())).collect();
        for (node_id, identity) in targets {
            let msg = Msg::request(self.self_sender_id(), self.clock.reference_time(), 0, kind.clone());
            if let Err(e) = self.control.send(&identity, &msg).await {
                warn!(target: "hermes::broker", node_id = %node_id, error = %e, "failed to command local node");
            }
        }
    }

    /// Drive the FSM to a terminal state and report the outcome (spec §6).
    /// Each phase is a focused helper so the overall shape mirrors the
    /// `BOOT -> DISCOVER -> SYNC -> READY -> RUN -> DRAIN -> STOP` table in
    /// spec §4.1 directly.
    pub async fn run(mut self) -> BrokerOutcome {
        loop {
            let step = match &self.state {
                BrokerState::Boot => self.do_boot().await,
                BrokerState::Discover => self.do_discover().await,
                BrokerState::Sync => self.do_sync().await,
                BrokerState::Ready => self.do_ready().await,
                BrokerState::Run { .. } => self.do_run().await,
                BrokerState::Drain => self.do_drain().await,
                BrokerState::Stop => return BrokerOutcome::CleanStop,
                BrokerState::Failed => return BrokerOutcome::DiscoverySyncFailure("broker entered FAILED".into()),
            };
            match step {
                Ok(next) => {
                    info!(target: "hermes::broker", from = self.state.name(), to = next.name(), "state transition");
                    self.state = next;
                }
                Err(e) => {
                    error!(target: "hermes::broker", error = %e, "fatal in state {}", self.state.name());
                    return BrokerOutcome::from_error(&e);
                }
            }
        }
    }

    async fn do_boot(&mut self) -> Result<BrokerState, Error> {
        Ok(BrokerState::Discover)
    }

    async fn do_discover(&mut self) -> Result<BrokerState, Error> {
        let expected: BTreeSet<BrokerId> = self
            .config
            .peers
            .iter()
            .map(|p| BrokerId::from(p.broker_id.as_str()))
            .collect();
        if expected.is_empty() {
            return Ok(BrokerState::Sync);
        }

        let payload = self.announce_payload(
            &self.control_endpoint.zmq_endpoint(),
            &self.data_endpoint.zmq_endpoint(),
        );
        let mut tracker = DiscoveryTracker::new(expected, self.config.sync.discover_timeout_ms);
        let mut next_gossip = Instant::now();
        loop {
            // Re-announce to every peer not yet confirmed until quorum or
            // timeout (spec §4.1: "announce self to configured peer
            // endpoints"); zeromq queues outbound frames, so this is
            // idempotent gossip rather than a handshake.
            if Instant::now() >= next_gossip {
                for peer in &self.config.peers {
                    if !tracker.has_announced(&BrokerId::from(peer.broker_id.as_str())) {
                        self.tell_peer(&peer.control_endpoint, MsgKind::Announce(payload.clone())).await;
                    }
                }
                next_gossip = Instant::now() + Duration::from_millis(250);
            }

            let recv = timeout(Duration::from_millis(50), self.control.recv()).await;
            if let Ok(Ok((identity, msg))) = recv {
                self.note_local_node(&identity, &msg);
                if let MsgKind::Announce(payload) = &msg.kind {
                    let descriptor = BrokerDescriptor {
                        broker_id: msg.sender_id.broker_id.clone(),
                        control_endpoint: payload.control_endpoint.clone(),
                        data_endpoint: payload.data_endpoint.clone(),
                        local_nodes: vec![],
                        peer_brokers: vec![],
                        is_clock_reference: payload.clock_eligible,
                    };
                    tracker.on_announce(descriptor.clone());
                    self.peers.insert(descriptor);
                }
            }
            match tracker.poll() {
                DiscoveryOutcome::Quorum(_) => return Ok(BrokerState::Sync),
                DiscoveryOutcome::TimedOut => {
                    return Err(err_kind(
                        ErrorKind::Discovery,
                        "peer(s) unreachable within discover_timeout_ms",
                    ))
                }
                DiscoveryOutcome::Pending => continue,
            }
        }
    }

    async fn do_sync(&mut self) -> Result<BrokerState, Error> {
        let mut candidates: BTreeSet<BrokerId> = self.peers.clock_eligible_ids().into_iter().collect();
        if self.config.clock_eligible {
            candidates.insert(self.self_id.clone());
        }
        let elected = elect_reference(&candidates)?;
        let am_reference = reference_is_self(&elected, &self.self_id);
        info!(target: "hermes::broker", elected = %elected, am_reference, "SYNC: reference elected");

        if !am_reference {
            let reference = self
                .peers
                .get(&elected)
                .ok_or_else(|| err_kind(ErrorKind::Sync, "elected reference broker is not a known peer"))?
                .control_endpoint
                .clone();
            self.probe_reference(&reference).await?;
        }

        let expected: BTreeSet<BrokerId> = self
            .config
            .peers
            .iter()
            .map(|p| BrokerId::from(p.broker_id.as_str()))
            .collect();
        for peer in &self.config.peers {
            self.tell_peer(&peer.control_endpoint, MsgKind::SyncOk { elected: elected.clone() }).await;
        }

        let mut barrier = SyncBarrier::new(expected, self.config.sync.sync_timeout_ms);
        loop {
            let recv = timeout(Duration::from_millis(50), self.control.recv()).await;
            if let Ok(Ok((identity, msg))) = recv {
                self.note_local_node(&identity, &msg);
                match &msg.kind {
                    MsgKind::SyncOk { elected: their_elected } => {
                        if *their_elected != elected {
                            warn!(
                                target: "hermes::broker", mine = %elected, theirs = %their_elected,
                                "split reference: peer disagrees on elected broker"
                            );
                            return Ok(BrokerState::Failed);
                        }
                        barrier.on_sync_ok(msg.sender_id.broker_id.clone())
                    }
                    MsgKind::SyncProbe => {
                        let reply = msg.reply(
                            self.self_sender_id(),
                            self.clock.reference_time(),
                            MsgKind::SyncReply { reference_origin_ns: self.clock.reference_time() },
                        );
                        let _ = self.control.send(&identity, &reply).await;
                    }
                    _ => {}
                }
            }
            match barrier.poll() {
                SyncOutcome::AllAcked => return Ok(BrokerState::Ready),
                SyncOutcome::TimedOut => {
                    return Err(err_kind(ErrorKind::Sync, "peers did not all acknowledge SYNC_OK in time"))
                }
                SyncOutcome::Pending => continue,
            }
        }
    }

    /// Connect to the elected reference broker's control socket, send one
    /// `SYNC_PROBE`, and block for its `SYNC_REPLY` to compute this
    /// broker's clock offset (spec §4.1's single round-trip exchange).
    async fn probe_reference(&self, reference_control_endpoint: &str) -> Result<(), Error> {
        let endpoint = parse_zmq_endpoint(reference_control_endpoint)
            .ok_or_else(|| err_kind(ErrorKind::Sync, "malformed reference control endpoint"))?;
        let mut client = CoordinationClient::connect(&endpoint).await?;
        let probe_sent_local_ns = self.clock.reference_time();
        client
            .send(&Msg::request(self.self_sender_id(), probe_sent_local_ns, 0, MsgKind::SyncProbe))
            .await?;
        // A reference broker that answered ANNOUNCE but never replies to
        // SYNC_PROBE must still be a sync-error within sync_timeout_ms, not
        // a hang (spec §8 boundary behavior).
        let reply = timeout(Duration::from_millis(self.config.sync.sync_timeout_ms), client.recv())
            .await
            .map_err(|_| err_kind(ErrorKind::Sync, "reference broker did not reply to SYNC_PROBE in time"))??;
        let reply_received_local_ns = self.clock.reference_time();
        if let MsgKind::SyncReply { reference_origin_ns } = reply.kind {
            let offset = offset_from_exchange(probe_sent_local_ns, reply_received_local_ns, reference_origin_ns);
            self.clock.set_offset(offset);
            info!(target: "hermes::broker", offset_ns = offset, "SYNC: clock offset computed");
            Ok(())
        } else {
            Err(err_kind(ErrorKind::Sync, "expected SYNC_REPLY from reference broker"))
        }
    }

    async fn do_ready(&mut self) -> Result<BrokerState, Error> {
        let snapshot = self.peers.snapshot();
        for peer in snapshot.values() {
            let Some(endpoint) = parse_zmq_endpoint(&peer.data_endpoint) else { continue };
            match PeerSubscriber::connect(&endpoint).await {
                Ok(sub) => {
                    self.proxy.spawn_peer_relay(sub, self.cancel.clone());
                }
                Err(e) => warn!(target: "hermes::broker", peer = %peer.broker_id, error = %e, "could not subscribe to peer data plane"),
            }
        }

        // spec §4.1: "Broker commands each local Node to transition to its
        // own READY", then "Broker commands local Nodes START". Nodes
        // register by sending first (the ROUTER socket has no identity to
        // reply to until then), so wait for all of them before commanding.
        self.await_local_nodes().await?;
        self.command_local_nodes(MsgKind::Prepare).await;

        let started_at_reference_ns = self.clock.reference_time();
        if let Some(tx) = self.session_start_tx.take() {
            let _ = tx.send(started_at_reference_ns);
        }
        self.command_local_nodes(MsgKind::Start { started_at_reference_ns }).await;

        Ok(BrokerState::Run { started_at_reference_ns })
    }

    async fn do_run(&mut self) -> Result<BrokerState, Error> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(BrokerState::Drain);
            }
            let recv = timeout(Duration::from_millis(100), self.control.recv()).await;
            match recv {
                Ok(Ok((identity, msg))) => {
                    self.note_local_node(&identity, &msg);
                    self.handle_run_msg(msg).await
                }
                Ok(Err(e)) => {
                    warn!(target: "hermes::broker", error = %e, "peer lost, continuing with local subscribers");
                    self.diagnostics
                        .push(Diagnostic::for_node("unknown", DiagnosticKind::PeerLost));
                }
                Err(_) => continue,
            }
        }
    }

    async fn handle_run_msg(&mut self, msg: Msg) {
        match msg.kind {
            MsgKind::Drain => {
                self.cancel.cancel();
            }
            MsgKind::Status(payload) => {
                info!(target: "hermes::broker", node = %msg.sender_id, detail = %payload.detail, "node status");
            }
            MsgKind::Error(payload) => {
                warn!(target: "hermes::broker", node = %msg.sender_id, message = %payload.message, "node reported error");
            }
            // Re-published from the keyboard hub's broadcast subscriber
            // (spec §4.5, "one code path, two sinks"): fan this line out to
            // every local Node over the same control socket they already
            // use, whether or not they happen to live in this process.
            MsgKind::Keyboard(line) => {
                self.command_local_nodes(MsgKind::Keyboard(line)).await;
            }
            _ => {}
        }
    }

    async fn do_drain(&mut self) -> Result<BrokerState, Error> {
        self.command_local_nodes(MsgKind::Drain).await;
        let deadline = crate::deadline::Deadline::from_millis(self.config.storage.drain_deadline_ms);
        while !deadline.is_expired() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.command_local_nodes(MsgKind::Stop).await;
        Ok(BrokerState::Stop)
    }

    pub fn announce_payload(&self, control_endpoint: &str, data_endpoint: &str) -> AnnouncePayload {
        AnnouncePayload {
            broker_id: self.self_id.clone(),
            clock_eligible: self.config.clock_eligible,
            control_endpoint: control_endpoint.to_owned(),
            data_endpoint: data_endpoint.to_owned(),
        }
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn proxy(&self) -> &PubSubProxy {
        &self.proxy
    }

    pub fn config(&self) -> &HermesConfig {
        &self.config
    }

    pub fn self_id(&self) -> &BrokerId {
        &self.self_id
    }
}

/// Parse a `tcp://host:port` endpoint string as carried in [`AnnouncePayload`]
/// and [`hermes_proto::BrokerDescriptor`]. `None` on anything malformed.
fn parse_zmq_endpoint(s: &str) -> Option<Endpoint> {
    let (host, port) = s.strip_prefix("tcp://")?.rsplit_once(':')?;
    Some(Endpoint::new(host, port.parse().ok()?))
}
