// Tagged-variant state machine, not ad-hoc flags (spec §9). Shaped after
// the teacher's `State` enum in what is now `hermes-broker` (`Put`/`Err`/
// `Seq`/`Run`/`End`): each state that carries bookkeeping gets its own
// payload instead of a side table keyed by a status code.

use hermes_base::Error;
use hermes_proto::Nanos;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerState {
    Boot,
    Discover,
    Sync,
    Ready,
    Run { started_at_reference_ns: Nanos },
    Drain,
    Stop,
    Failed,
}

impl BrokerState {
    pub fn name(&self) -> &'static str {
        match self {
            BrokerState::Boot => "BOOT",
            BrokerState::Discover => "DISCOVER",
            BrokerState::Sync => "SYNC",
            BrokerState::Ready => "READY",
            BrokerState::Run { .. } => "RUN",
            BrokerState::Drain => "DRAIN",
            BrokerState::Stop => "STOP",
            BrokerState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BrokerState::Stop | BrokerState::Failed)
    }
}

/// What the process exits with once the FSM reaches a terminal state
/// (spec §6 exit codes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOutcome {
    CleanStop,
    UserAbort,
    ConfigurationError(String),
    DiscoverySyncFailure(String),
    StorageOverflow(String),
    FatalError(String),
}

impl BrokerOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            BrokerOutcome::CleanStop => 0,
            BrokerOutcome::UserAbort => 1,
            BrokerOutcome::ConfigurationError(_) => 2,
            BrokerOutcome::DiscoverySyncFailure(_) => 3,
            BrokerOutcome::StorageOverflow(_) => 4,
            BrokerOutcome::FatalError(_) => 5,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        use hermes_base::ErrorKind;
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::Configuration => BrokerOutcome::ConfigurationError(msg),
            ErrorKind::Discovery | ErrorKind::Sync => BrokerOutcome::DiscoverySyncFailure(msg),
            ErrorKind::Overflow => BrokerOutcome::StorageOverflow(msg),
            ErrorKind::Device
            | ErrorKind::Transport
            | ErrorKind::DrainTimeout
            | ErrorKind::Fatal => BrokerOutcome::FatalError(msg),
        }
    }
}

/// A total function `(state, event) -> state`; undefined pairs are
/// programming errors (spec §9), surfaced as `Err` here rather than
/// panicking so the broker loop can log and fail the session cleanly.
pub fn transition(from: &BrokerState, event: &str) -> Result<BrokerState, Error> {
    use BrokerState::*;
    let to = match (from, event) {
        (Boot, "nodes_initialized") => Discover,
        (Discover, "quorum_reached") => Sync,
        (Discover, "timeout") => Failed,
        (Sync, "sync_ok") => Ready,
        (Sync, "split_reference") => Failed,
        (Sync, "timeout") => Failed,
        (Ready, "all_ready") => Run {
            started_at_reference_ns: 0,
        },
        (Run { .. }, "drain_requested") => Drain,
        (Drain, "drained") => Stop,
        (_, "abort") => Failed,
        _ => {
            return Err(hermes_base::err_kind(
                hermes_base::ErrorKind::Fatal,
                format!("undefined transition: {} + {}", from.name(), event),
            ))
        }
    };
    Ok(to)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boot_to_discover() {
        assert_eq!(transition(&BrokerState::Boot, "nodes_initialized").unwrap(), BrokerState::Discover);
    }

    #[test]
    fn undefined_transition_is_an_error() {
        assert!(transition(&BrokerState::Boot, "all_ready").is_err());
    }

    #[test]
    fn any_state_can_abort() {
        assert_eq!(transition(&BrokerState::Run { started_at_reference_ns: 5 }, "abort").unwrap(), BrokerState::Failed);
    }
}
