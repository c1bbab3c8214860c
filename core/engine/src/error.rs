//! Error taxonomy for the session engine.
//!
//! Failures fall into three families: fatal setup failures the binary turns
//! into a process exit (`Connect`, `ExtensionMissing`), statement-level
//! failures the driver recovers from locally, and protocol violations that
//! are never recovered.

use std::io;

use thiserror::Error;

use crate::wire::ErrorClass;

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not be reached. Fatal: the caller exits, no retry.
    #[error("could not connect to backend at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The debugging extension is not installed on the backend. Fatal.
    #[error("debugging extension `{0}` is not installed on the backend")]
    ExtensionMissing(String),

    /// The in-flight statement was cancelled by the backend. This is the
    /// expected shutdown signal for the target worker's keep-alive loop.
    #[error("statement cancelled by backend")]
    Cancelled,

    /// The backend reported a statement failure outside the classes the
    /// driver recovers from locally.
    #[error("backend error ({class:?}): {message}")]
    Backend { class: ErrorClass, message: String },

    /// The backend broke the wire contract: an out-of-place frame, a
    /// response for the wrong statement, or an empty result where exactly
    /// one row is mandatory.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A call expression without both argument delimiters or with an empty
    /// head. Recovered: logged, session start fails, no connection opened.
    #[error("call expression is incomplete: {0}")]
    InvalidCallSyntax(String),

    /// No debuggable routine matches the call head.
    #[error("no routine matches `{0}`")]
    UnresolvedTarget(String),

    /// A control command was issued before `attach`.
    #[error("control session is not attached")]
    NotAttached,

    /// A dispatched command is missing a required argument.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// The bounded wait for the proxy endpoint expired before the first
    /// notification arrived.
    #[error("timed out waiting for the proxy endpoint notification")]
    StartupTimeout,

    /// Transport-level failure outside a statement's own error channel.
    #[error("transport failure: {0}")]
    Io(#[from] io::Error),

    /// A frame that is not valid JSON or does not match the wire schema.
    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}

impl Error {
    /// Whether this failure ends the target worker's keep-alive loop as the
    /// expected cooperative-cancellation signal rather than an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
