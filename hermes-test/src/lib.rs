//! Shared harness for integration tests implementing spec §8's scenarios
//! (E1–E6) and invariants (1–8): a settable clock for deterministic
//! `reference_ts_ns` values, an in-memory [`Msg`] duplex standing in for a
//! coordination socket, and golden-file comparison helpers.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use hermes_base::{err_kind, Error, ErrorKind};
use hermes_proto::{Msg, Nanos};

/// A reference clock whose value is set directly rather than derived from
/// wall-clock elapsed time, so tests can assert exact `reference_ts_ns`
/// values instead of tolerance ranges.
pub struct FixedClock {
    now_ns: std::sync::atomic::AtomicI64,
}

impl FixedClock {
    pub fn at(start_ns: Nanos) -> Self {
        FixedClock {
            now_ns: std::sync::atomic::AtomicI64::new(start_ns),
        }
    }

    pub fn reference_time(&self) -> Nanos {
        self.now_ns.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn advance(&self, delta_ns: Nanos) -> Nanos {
        self.now_ns.fetch_add(delta_ns, std::sync::atomic::Ordering::AcqRel) + delta_ns
    }
}

/// One end of an in-memory [`Msg`] duplex, standing in for a
/// [`hermes_transport::CoordinationClient`]/`CoordinationServer` pair in
/// tests that exercise coordination logic without a real socket.
pub struct MsgEndpoint {
    tx: mpsc::Sender<Msg>,
    rx: mpsc::Receiver<Msg>,
}

impl MsgEndpoint {
    pub async fn send(&self, msg: Msg) -> Result<(), Error> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| err_kind(ErrorKind::Transport, "in-memory duplex peer dropped"))
    }

    pub async fn recv(&mut self) -> Result<Msg, Error> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| err_kind(ErrorKind::Transport, "in-memory duplex closed"))
    }
}

/// A connected pair: what `a` sends, `b` receives, and vice versa.
pub fn msg_duplex(capacity: usize) -> (MsgEndpoint, MsgEndpoint) {
    let (tx_a, rx_b) = mpsc::channel(capacity);
    let (tx_b, rx_a) = mpsc::channel(capacity);
    (
        MsgEndpoint { tx: tx_a, rx: rx_a },
        MsgEndpoint { tx: tx_b, rx: rx_b },
    )
}

/// Asserts per-publisher sequence numbers are strictly monotonic (spec §5,
/// "Ordering guarantees").
pub fn assert_strictly_monotonic(seqs: &[u64]) {
    for pair in seqs.windows(2) {
        assert!(pair[1] > pair[0], "sequence not strictly monotonic: {pair:?}");
    }
}

/// Asserts `reference_ts_ns` is non-decreasing per stream (spec §5).
pub fn assert_non_decreasing(timestamps: &[i64]) {
    for pair in timestamps.windows(2) {
        assert!(pair[1] >= pair[0], "reference_ts_ns went backwards: {pair:?}");
    }
}

fn golden_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("golden").join(relative)
}

/// Compares `actual` against a checked-in fixture at
/// `<workspace>/golden/<relative>`. Set `UPDATE_GOLDEN=1` to (re)write the
/// fixture from `actual` instead of comparing.
pub fn assert_golden_bytes(relative: &str, actual: &[u8]) {
    let path = golden_path(relative);
    if std::env::var_os("UPDATE_GOLDEN").is_some() {
        std::fs::create_dir_all(path.parent().expect("golden path has a parent")).expect("create golden dir");
        std::fs::write(&path, actual).expect("write golden fixture");
        return;
    }
    let expected = std::fs::read(&path)
        .unwrap_or_else(|e| panic!("missing golden fixture {path:?}: {e} (rerun with UPDATE_GOLDEN=1)"));
    assert_eq!(actual, expected.as_slice(), "golden fixture mismatch: {path:?}");
}
