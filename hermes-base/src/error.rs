// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A coarse kind tag so the binary's exit-code mapping (spec §6) is a total function.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// Coarse error taxonomy, per the propagation policy in spec §7. Each kind
/// maps to exactly one of the process exit codes in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Discovery,
    Sync,
    Device,
    Transport,
    Overflow,
    DrainTimeout,
    Fatal,
}

impl ErrorKind {
    /// Process exit code for this kind, per spec §6.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Configuration => 2,
            ErrorKind::Discovery | ErrorKind::Sync => 3,
            ErrorKind::Overflow => 4,
            ErrorKind::Device | ErrorKind::Transport | ErrorKind::DrainTimeout | ErrorKind::Fatal => 5,
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {
    fn description(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.source)
    }
}
impl std::error::Error for Error {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::Fatal, err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "hermes", kind = ?kind, "{:?}", err);
        let source = DynBacktraceError::from(err);
        Error { kind, source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Build a `Fatal`-kind error from a message. Convenient for call sites that
/// don't need a distinguishable kind; prefer [`err_kind`] when the caller
/// knows which of spec §7's error kinds applies.
pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    err_kind(ErrorKind::Fatal, msg)
}

pub fn err_kind(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

#[test]
fn test_error() {
    let e = err("test error");
    assert_eq!(e.kind(), ErrorKind::Fatal);
}

#[test]
fn test_error_kind_exit_codes() {
    assert_eq!(ErrorKind::Configuration.exit_code(), 2);
    assert_eq!(ErrorKind::Discovery.exit_code(), 3);
    assert_eq!(ErrorKind::Sync.exit_code(), 3);
    assert_eq!(ErrorKind::Overflow.exit_code(), 4);
    assert_eq!(ErrorKind::Device.exit_code(), 5);
}
