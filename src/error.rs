//! Error types for the policy execution pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pipeline.
///
/// Each variant corresponds to one of the error kinds named in the
/// propagation design: a policy's voluntary rejection, a policy's
/// unexpected failure, a backend failure, a sink failure, and a client
/// disconnect. See each variant's doc comment for how the orchestrator
/// reacts to it.
#[derive(Error, Debug)]
pub enum Error {
    /// A policy voluntarily rejected a request or response. Surfaced to the
    /// client as the policy's own replacement content; never aborts the
    /// transaction.
    #[error("policy violation: {message}")]
    PolicyViolation {
        /// Human-readable reason, forwarded to the client.
        message: String,
    },

    /// A policy hook raised unexpectedly. Aborts the transaction.
    #[error("policy hook failed: {0}")]
    PolicyError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The upstream LLM returned a non-success response.
    #[error("backend error (status {status:?}): {message}")]
    BackendError {
        /// HTTP status code, when the transport is HTTP.
        status: Option<u16>,
        message: String,
    },

    /// The configured deadline for a backend call expired.
    #[error("backend call timed out")]
    BackendTimeout,

    /// An observability sink failed. Always caught at the `record()` call
    /// site and logged; this variant exists so sinks have something to
    /// return, it is never propagated to a transaction caller.
    #[error("sink {sink} failed: {source}")]
    SinkError {
        sink: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The client disconnected or the transaction was otherwise cancelled
    /// externally.
    #[error("client cancelled the transaction")]
    ClientCancelled,

    /// Invalid configuration supplied at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// HTTP transport error underneath a backend call.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Construct a [`Error::PolicyViolation`].
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Error::PolicyViolation {
            message: message.into(),
        }
    }

    /// Construct a [`Error::PolicyError`] from any boxed source error.
    pub fn policy_error(
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::PolicyError(source.into())
    }

    /// Construct a [`Error::BackendError`].
    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::BackendError {
            status,
            message: message.into(),
        }
    }

    /// Construct a [`Error::SinkError`].
    pub fn sink(
        sink: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::SinkError {
            sink,
            source: source.into(),
        }
    }

    /// Construct a [`Error::Config`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error should be recorded as a partial-stream / terminal
    /// marker rather than surfaced verbatim (matches the propagation policy
    /// in the error handling design: sink and cancellation errors are
    /// recovered locally, everything else is surfaced but always wrapped in
    /// a recorder event).
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, Error::SinkError { .. } | Error::ClientCancelled)
    }
}
