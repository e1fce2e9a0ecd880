/// Non-fatal conditions that are logged and counted but never propagate as
/// an [`Error`](crate::Error), per spec §7's propagation policy: "transient
/// per-sample errors are logged and counted per stream but do not
/// propagate".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A gap was observed in a publisher's sequence numbers.
    SequenceGap { expected: u64, got: u64 },
    /// A peer broker was lost mid-`RUN` (spec §4.1 edge cases, E5).
    PeerLost,
    /// `DRAIN` hit its soft deadline before Storage finished flushing.
    DrainTimeout { unflushed: u64 },
    /// A single send/recv on the transport failed but stayed under the
    /// persistent-failure threshold (spec §7, Transport error).
    TransportHiccup,
}

/// A structured record of a [`DiagnosticKind`], attributed to the stream or
/// node it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stream_id: Option<String>,
    pub node_id: Option<String>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn for_stream(stream_id: impl Into<String>, kind: DiagnosticKind) -> Self {
        Diagnostic {
            stream_id: Some(stream_id.into()),
            node_id: None,
            kind,
        }
    }

    pub fn for_node(node_id: impl Into<String>, kind: DiagnosticKind) -> Self {
        Diagnostic {
            stream_id: None,
            node_id: Some(node_id.into()),
            kind,
        }
    }
}
