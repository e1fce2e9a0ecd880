// Logging setup, per-component `target: "hermes::<component>"` (spec §6,
// ambient). Mirrors the teacher's `tracing` usage in
// `hermes_base::error::err`, just with a process-wide subscriber installed
// once at startup instead of ad-hoc `tracing::error!` calls.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading `RUST_LOG` (default
/// `info`). Call once, early in `main`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
