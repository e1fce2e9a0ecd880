// Broker-level SYNC scenarios that need two real control sockets talking
// over loopback TCP, too heavyweight for the `#[cfg(test)]` unit modules in
// `src/` (spec §8: invariants 3, 4; scenario E2; the ANNOUNCE/SYNC_PROBE
// boundary behavior).

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use hermes_admin::{ExperimentConfig, HermesConfig, PeerConfig, StorageConfig, SyncConfig};
use hermes_broker::{Broker, BrokerOutcome};
use hermes_proto::{AnnouncePayload, BrokerId, GlobalNodeId, Msg, MsgKind, NodeId};
use hermes_transport::{CoordinationClient, CoordinationServer, Endpoint};

static NEXT_PORT: AtomicU16 = AtomicU16::new(29100);

fn alloc_ports(n: u16) -> u16 {
    NEXT_PORT.fetch_add(n, Ordering::Relaxed)
}

fn config(broker_id: &str, clock_eligible: bool, peers: Vec<PeerConfig>, root_dir: &std::path::Path) -> HermesConfig {
    HermesConfig {
        broker_id: broker_id.to_string(),
        peers,
        clock_eligible,
        nodes: vec![],
        storage: StorageConfig {
            root_dir: root_dir.to_string_lossy().into_owned(),
            flush_hz: 10.0,
            high_water: 64,
            drain_deadline_ms: 100,
            video_codec: None,
        },
        sync: SyncConfig {
            discover_timeout_ms: 2_000,
            sync_timeout_ms: 300,
        },
        experiment: ExperimentConfig::default(),
    }
}

/// E2. Two brokers both `clock_eligible`: election must pick the
/// lexicographically smaller id, and the other's `offset_ns` must land
/// within a tight tolerance of a real loopback round trip (spec §8,
/// invariant 3).
#[tokio::test]
async fn reference_election_picks_lexicographically_smaller_id() {
    let base = alloc_ports(4);
    let a_control = Endpoint::new("127.0.0.1", base);
    let a_data = Endpoint::new("127.0.0.1", base + 1);
    let b_control = Endpoint::new("127.0.0.1", base + 2);
    let b_data = Endpoint::new("127.0.0.1", base + 3);

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let config_a = config(
        "a",
        true,
        vec![PeerConfig {
            broker_id: "b".into(),
            control_endpoint: b_control.zmq_endpoint(),
            data_endpoint: b_data.zmq_endpoint(),
        }],
        dir_a.path(),
    );
    let config_b = config(
        "b",
        true,
        vec![PeerConfig {
            broker_id: "a".into(),
            control_endpoint: a_control.zmq_endpoint(),
            data_endpoint: a_data.zmq_endpoint(),
        }],
        dir_b.path(),
    );

    let cancel_a = CancellationToken::new();
    let cancel_b = CancellationToken::new();

    let broker_a = Broker::boot(config_a, a_control, a_data, cancel_a.clone()).await.unwrap();
    let broker_b = Broker::boot(config_b, b_control, b_data, cancel_b.clone()).await.unwrap();

    let clock_a = broker_a.clock();
    let clock_b = broker_b.clock();

    let task_a = tokio::spawn(broker_a.run());
    let task_b = tokio::spawn(broker_b.run());

    // Enough for DISCOVER's 250ms gossip interval plus one SYNC round trip.
    tokio::time::sleep(Duration::from_millis(600)).await;
    cancel_a.cancel();
    cancel_b.cancel();

    let outcome_a = tokio::time::timeout(Duration::from_secs(3), task_a).await.unwrap().unwrap();
    let outcome_b = tokio::time::timeout(Duration::from_secs(3), task_b).await.unwrap().unwrap();
    assert!(matches!(outcome_a, BrokerOutcome::CleanStop), "{outcome_a:?}");
    assert!(matches!(outcome_b, BrokerOutcome::CleanStop), "{outcome_b:?}");

    // "a" < "b" lexicographically, so "a" is the reference and never calls
    // `set_offset`; "b" computed a real offset relative to it.
    assert_eq!(clock_a.offset_ns(), 0);
    assert!(
        clock_b.offset_ns().abs() < 50_000_000,
        "loopback offset should be small, got {}",
        clock_b.offset_ns()
    );
}

/// Boundary behavior (spec §8): a peer that answers ANNOUNCE but never
/// replies to SYNC_PROBE must fail SYNC within `sync_timeout_ms`, not hang.
#[tokio::test]
async fn silent_reference_peer_is_a_sync_error_within_timeout() {
    let base = alloc_ports(4);
    let real_control = Endpoint::new("127.0.0.1", base);
    let real_data = Endpoint::new("127.0.0.1", base + 1);
    let fake_control = Endpoint::new("127.0.0.1", base + 2);

    let dir = tempfile::tempdir().unwrap();
    let sync_timeout_ms = 300;
    let mut real_config = config(
        "zz",
        false,
        vec![PeerConfig {
            broker_id: "aa".into(),
            control_endpoint: fake_control.zmq_endpoint(),
            data_endpoint: fake_control.zmq_endpoint(),
        }],
        dir.path(),
    );
    real_config.sync.sync_timeout_ms = sync_timeout_ms;

    let fake_control_for_task = fake_control.clone();
    let real_control_for_fake = real_control.clone();
    tokio::spawn(async move {
        let mut server = CoordinationServer::bind(&fake_control_for_task).await.unwrap();
        loop {
            let Ok((_, msg)) = server.recv().await else { return };
            if let MsgKind::Announce(_) = msg.kind {
                let sender = GlobalNodeId {
                    broker_id: BrokerId::from("aa"),
                    node_id: NodeId::from("peer"),
                };
                let payload = AnnouncePayload {
                    broker_id: BrokerId::from("aa"),
                    clock_eligible: true,
                    control_endpoint: fake_control_for_task.zmq_endpoint(),
                    data_endpoint: fake_control_for_task.zmq_endpoint(),
                };
                if let Ok(mut client) = CoordinationClient::connect(&real_control_for_fake).await {
                    let _ = client
                        .send(&Msg::request(sender, 0, 0, MsgKind::Announce(payload)))
                        .await;
                }
            }
            // Anything else, notably SYNC_PROBE, is received and ignored:
            // this peer never sends SYNC_REPLY.
        }
    });

    let cancel = CancellationToken::new();
    let broker = Broker::boot(real_config, real_control, real_data, cancel).await.unwrap();

    let started = Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(3), broker.run()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(outcome, BrokerOutcome::DiscoverySyncFailure(_)), "{outcome:?}");
    assert!(
        elapsed < Duration::from_millis(2_000 + sync_timeout_ms + 500),
        "expected sync error well within discover+sync timeouts, took {elapsed:?}"
    );
}
