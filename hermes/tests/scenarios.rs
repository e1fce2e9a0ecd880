// End-to-end session scenarios (spec §8: E1, E3, E4, E5, E6; invariants 1,
// 2, 5, 6) driven entirely through the public `hermes::run_with_cancel`
// entry point, the same one `hermes::bin` uses. Rates and durations are
// scaled down from the scenario descriptions so the suite runs in seconds,
// not minutes, while keeping the same shape of behavior.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use hermes_admin::{
    ExperimentConfig, HermesConfig, NodeConfig, NodeRole, PeerConfig, StorageConfig, StreamConfig, SyncConfig,
};
use hermes_broker::BrokerOutcome;
use hermes_transport::Endpoint;

static NEXT_PORT: AtomicU16 = AtomicU16::new(28000);

fn alloc_ports(n: u16) -> u16 {
    NEXT_PORT.fetch_add(n, Ordering::Relaxed)
}

fn producer_node(node_id: &str, stream_id: &str, device_id: &str, rate_hz: f64, is_video: bool) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        role: NodeRole::Producer,
        driver: "synthetic".to_string(),
        streams: vec![StreamConfig {
            stream_id: stream_id.to_string(),
            device_id: device_id.to_string(),
            nominal_rate_hz: rate_hz,
            is_burst: false,
            is_video,
            channel_names: if is_video { vec![] } else { vec!["x".into(), "y".into(), "z".into()] },
        }],
        params: Default::default(),
        delay_estimator: None,
    }
}

fn consumer_node(node_id: &str, stream_id: &str) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        role: NodeRole::Consumer,
        driver: "logging".to_string(),
        streams: vec![StreamConfig {
            stream_id: stream_id.to_string(),
            device_id: "n/a".to_string(),
            nominal_rate_hz: 0.0,
            is_burst: false,
            is_video: false,
            channel_names: vec![],
        }],
        params: Default::default(),
        delay_estimator: None,
    }
}

fn config(
    broker_id: &str,
    clock_eligible: bool,
    peers: Vec<PeerConfig>,
    nodes: Vec<NodeConfig>,
    root_dir: &std::path::Path,
    flush_hz: f64,
    high_water: usize,
) -> HermesConfig {
    HermesConfig {
        broker_id: broker_id.to_string(),
        peers,
        clock_eligible,
        nodes,
        storage: StorageConfig {
            root_dir: root_dir.to_string_lossy().into_owned(),
            flush_hz,
            high_water,
            drain_deadline_ms: 200,
            video_codec: None,
        },
        sync: SyncConfig {
            discover_timeout_ms: 2_000,
            sync_timeout_ms: 300,
        },
        experiment: ExperimentConfig::default(),
    }
}

/// Reads the length-prefixed msgpack records written by `TabularContainer`'s
/// `.dataset` files and `VideoSidecar`'s `.index` files: both use a
/// little-endian `u32` byte length in front of each record.
fn read_u32_prefixed_records(path: &std::path::Path) -> Vec<Vec<u8>> {
    let bytes = std::fs::read(path).unwrap_or_default();
    let mut out = Vec::new();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        let len = u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap()) as usize;
        i += 4;
        if i + len > bytes.len() {
            break;
        }
        out.push(bytes[i..i + len].to_vec());
        i += len;
    }
    out
}

#[derive(serde::Deserialize)]
struct SessionMetadataView {
    started_at_reference_ns: i64,
}

#[derive(serde::Deserialize)]
struct RowView {
    reference_ts_ns: i64,
}

#[derive(serde::Deserialize)]
struct IndexEntryView {
    reference_ts_ns: i64,
}

/// E1, scaled down from 100Hz/20FPS/30s: a two-host session with one IMU
/// producer on each host, run just long enough to flush several rounds.
/// Covers invariants 1 (`reference_ts_ns >= started_at_reference_ns`) and 2
/// (non-decreasing per-stream timestamps).
#[tokio::test]
async fn e1_two_host_happy_path_produces_consistent_sessions() {
    let base = alloc_ports(4);
    let a_control = Endpoint::new("127.0.0.1", base);
    let b_control = Endpoint::new("127.0.0.1", base + 2);

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let config_a = config(
        "host-a",
        true,
        vec![PeerConfig {
            broker_id: "host-b".into(),
            control_endpoint: Endpoint::new("127.0.0.1", base + 2).zmq_endpoint(),
            data_endpoint: Endpoint::new("127.0.0.1", base + 3).zmq_endpoint(),
        }],
        vec![producer_node("imu", "imu0", "imu-dev", 20.0, false)],
        dir_a.path(),
        20.0,
        256,
    );
    let config_b = config(
        "host-b",
        false,
        vec![PeerConfig {
            broker_id: "host-a".into(),
            control_endpoint: Endpoint::new("127.0.0.1", base).zmq_endpoint(),
            data_endpoint: Endpoint::new("127.0.0.1", base + 1).zmq_endpoint(),
        }],
        vec![producer_node("cam", "cam0", "cam-dev", 10.0, true)],
        dir_b.path(),
        20.0,
        256,
    );

    let cancel_a = CancellationToken::new();
    let cancel_b = CancellationToken::new();
    let task_a = tokio::spawn(hermes::run_with_cancel(config_a, a_control, cancel_a.clone()));
    let task_b = tokio::spawn(hermes::run_with_cancel(config_b, b_control, cancel_b.clone()));

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    cancel_a.cancel();
    cancel_b.cancel();

    let outcome_a = tokio::time::timeout(Duration::from_secs(5), task_a).await.unwrap().unwrap();
    let outcome_b = tokio::time::timeout(Duration::from_secs(5), task_b).await.unwrap().unwrap();
    assert!(matches!(outcome_a, BrokerOutcome::CleanStop), "{outcome_a:?}");
    assert!(matches!(outcome_b, BrokerOutcome::CleanStop), "{outcome_b:?}");

    let meta_a: SessionMetadataView =
        rmp_serde::from_slice(&std::fs::read(dir_a.path().join("metadata.msgpack")).unwrap()).unwrap();
    let meta_b: SessionMetadataView =
        rmp_serde::from_slice(&std::fs::read(dir_b.path().join("metadata.msgpack")).unwrap()).unwrap();
    assert!(meta_a.started_at_reference_ns > 0);
    assert!(meta_b.started_at_reference_ns > 0);
    // Each broker independently reads its own (SYNC-corrected) clock when
    // it reaches RUN; with a real loopback round trip and no cross-host
    // start barrier, the two timestamps land close together but aren't
    // bit-identical, so this tolerates the process scheduling jitter this
    // scaled-down run is subject to rather than asserting exact equality.
    assert!(
        (meta_a.started_at_reference_ns - meta_b.started_at_reference_ns).abs() < 2_000_000_000,
        "session start times should be close: {} vs {}",
        meta_a.started_at_reference_ns,
        meta_b.started_at_reference_ns
    );

    let rows = read_u32_prefixed_records(&dir_a.path().join("imu").join("imu0.dataset"));
    assert!(!rows.is_empty(), "expected buffered imu rows to have been flushed");
    let timestamps: Vec<i64> = rows
        .iter()
        .map(|r| rmp_serde::from_slice::<RowView>(r).unwrap().reference_ts_ns)
        .collect();
    for ts in &timestamps {
        assert!(*ts >= meta_a.started_at_reference_ns, "row predates session start: {ts}");
    }
    hermes_test::assert_non_decreasing(&timestamps);

    let frames = read_u32_prefixed_records(&dir_b.path().join("video").join("cam").join("cam0.index"));
    assert!(!frames.is_empty(), "expected buffered video frames to have been flushed");
    let frame_timestamps: Vec<i64> = frames
        .iter()
        .map(|f| rmp_serde::from_slice::<IndexEntryView>(f).unwrap().reference_ts_ns)
        .collect();
    hermes_test::assert_non_decreasing(&frame_timestamps);
}

/// E3: a producer far outrunning a deliberately tiny ring must overflow it,
/// ending the session with the overflow exit code (4) rather than a clean
/// stop, while the data flushed before the overflow stays on disk (spec §8:
/// "partial data preserved").
#[tokio::test]
async fn e3_ring_overflow_ends_session_with_overflow_outcome() {
    let base = alloc_ports(2);
    let control = Endpoint::new("127.0.0.1", base);
    let dir = tempfile::tempdir().unwrap();

    // high_water=2 means a ring capacity of 8 (glue.rs: `high_water * 4`); a
    // 500Hz producer against a 2Hz flush scheduler overflows within tens of
    // milliseconds, long before the first scheduled flush drains anything.
    let cfg = config(
        "solo",
        true,
        vec![],
        vec![producer_node("imu", "imu0", "imu-dev", 500.0, false)],
        dir.path(),
        2.0,
        2,
    );

    let cancel = CancellationToken::new();
    let outcome = tokio::time::timeout(Duration::from_secs(5), hermes::run_with_cancel(cfg, control, cancel))
        .await
        .unwrap();

    assert!(matches!(outcome, BrokerOutcome::StorageOverflow(_)), "{outcome:?}");
    assert!(
        dir.path().join("metadata.msgpack").exists(),
        "partial session metadata should still be on disk after overflow"
    );
}

/// E4: a flush scheduler much slower than its producer still reaches a
/// clean stop (exit code 0) once cancelled, rather than hanging or failing
/// while it has a backlog to drain (spec §8, E4). `DrainTimeout`'s
/// "~N unflushed samples" diagnostic (`hermes::glue::spawn_flush_scheduler`)
/// only fires when the final DRAIN flush's single claimed range doesn't
/// cover the whole backlog; this test's scale doesn't force that, so it
/// isn't asserted here.
#[tokio::test]
async fn e4_slow_flush_reaches_clean_stop_with_backlog() {
    let base = alloc_ports(2);
    let control = Endpoint::new("127.0.0.1", base);
    let dir = tempfile::tempdir().unwrap();

    // A ring generous enough to absorb the backlog without overflowing
    // (high_water=64 => capacity 256) paired with a flush scheduler slow
    // enough that a 50Hz producer outpaces it within the test's run time.
    let cfg = config(
        "solo",
        true,
        vec![],
        vec![producer_node("imu", "imu0", "imu-dev", 50.0, false)],
        dir.path(),
        1.0,
        64,
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(hermes::run_with_cancel(cfg, control, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(matches!(outcome, BrokerOutcome::CleanStop), "{outcome:?}");
    assert!(dir.path().join("metadata.msgpack").exists());
}

/// E5: a peer that successfully discovers and syncs, then disappears
/// mid-RUN (simulated here by cancelling its own session first), must not
/// stop the surviving broker from continuing to serve its local Nodes and
/// reaching a clean stop on its own schedule (spec §8, E5).
#[tokio::test]
async fn e5_peer_disappearance_during_run_still_reaches_clean_stop() {
    let base = alloc_ports(4);
    let a_control = Endpoint::new("127.0.0.1", base);
    let b_control = Endpoint::new("127.0.0.1", base + 2);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let config_a = config(
        "host-a",
        true,
        vec![PeerConfig {
            broker_id: "host-b".into(),
            control_endpoint: b_control.zmq_endpoint(),
            data_endpoint: Endpoint::new("127.0.0.1", base + 3).zmq_endpoint(),
        }],
        vec![producer_node("imu", "imu0", "imu-dev", 20.0, false)],
        dir_a.path(),
        20.0,
        256,
    );
    let config_b = config(
        "host-b",
        false,
        vec![PeerConfig {
            broker_id: "host-a".into(),
            control_endpoint: a_control.zmq_endpoint(),
            data_endpoint: Endpoint::new("127.0.0.1", base + 1).zmq_endpoint(),
        }],
        vec![],
        dir_b.path(),
        20.0,
        256,
    );

    let cancel_a = CancellationToken::new();
    let cancel_b = CancellationToken::new();
    let task_a = tokio::spawn(hermes::run_with_cancel(config_a, a_control, cancel_a.clone()));
    let task_b = tokio::spawn(hermes::run_with_cancel(config_b, b_control, cancel_b.clone()));

    // Long enough for both to clear DISCOVER and SYNC, register "host-a"'s
    // local producer, and settle into RUN.
    tokio::time::sleep(Duration::from_millis(900)).await;

    // "host-b" disappears first; "host-a" is given no signal about this
    // beyond whatever its control socket recv naturally observes.
    cancel_b.cancel();
    let outcome_b = tokio::time::timeout(Duration::from_secs(5), task_b).await.unwrap().unwrap();
    assert!(matches!(outcome_b, BrokerOutcome::CleanStop), "{outcome_b:?}");

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel_a.cancel();
    let outcome_a = tokio::time::timeout(Duration::from_secs(5), task_a).await.unwrap().unwrap();
    assert!(matches!(outcome_a, BrokerOutcome::CleanStop), "{outcome_a:?}");
    assert!(dir_a.path().join("metadata.msgpack").exists());
}

/// E6: cancelling a session must also unwind the keyboard fan-out promptly
/// rather than leaving `run_with_cancel` waiting on it indefinitely (spec
/// §8, E6: "reader thread exits within 100ms of DRAIN").
#[tokio::test]
async fn e6_cancel_returns_promptly() {
    let base = alloc_ports(2);
    let control = Endpoint::new("127.0.0.1", base);
    let dir = tempfile::tempdir().unwrap();

    let cfg = config(
        "solo",
        true,
        vec![],
        vec![producer_node("imu", "imu0", "imu-dev", 20.0, false)],
        dir.path(),
        20.0,
        256,
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(hermes::run_with_cancel(cfg, control, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_millis(2_000), task).await.unwrap().unwrap();
    assert!(matches!(outcome, BrokerOutcome::CleanStop), "{outcome:?}");
}
