use thiserror::Error;

/// Reasons a `traceparent` header value is rejected.
///
/// Returned by [`SpanIdentity::from_traceparent`](crate::trace::SpanIdentity::from_traceparent),
/// and wrapped in [`Error::TraceParent`] by
/// [`PersistedTraceContext::restore`](crate::replay::PersistedTraceContext::restore).
/// Propagators never surface these: a rejected header is logged and
/// extraction falls back to a fresh root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TraceParentError {
    /// The value does not have the expected number of `-` separated fields.
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),

    /// The version field is not two lowercase hex digits, or is `ff`.
    #[error("invalid version {0:?}")]
    Version(String),

    /// The trace id is not 32 lowercase hex digits, or is all zeros.
    #[error("invalid trace id {0:?}")]
    TraceId(String),

    /// The span id is not 16 lowercase hex digits, or is all zeros.
    #[error("invalid parent span id {0:?}")]
    SpanId(String),

    /// The flags field is not two lowercase hex digits.
    #[error("invalid trace flags {0:?}")]
    Flags(String),
}

/// Errors returned by this crate's fallible operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A persisted or supplied `traceparent` could not be parsed.
    #[error("invalid traceparent: {0}")]
    TraceParent(#[from] TraceParentError),

    /// A workflow input or correlation record could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
