// Node FSM base (spec §4.2), shaped the same way as the Broker's: tagged
// variants, not flags (spec §9).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Init,
    Ready,
    Running,
    Draining,
    Done,
    Error,
}

impl NodeState {
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Init => "INIT",
            NodeState::Ready => "READY",
            NodeState::Running => "RUNNING",
            NodeState::Draining => "DRAINING",
            NodeState::Done => "DONE",
            NodeState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Done | NodeState::Error)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn done_and_error_are_terminal() {
        assert!(NodeState::Done.is_terminal());
        assert!(NodeState::Error.is_terminal());
        assert!(!NodeState::Running.is_terminal());
    }
}
