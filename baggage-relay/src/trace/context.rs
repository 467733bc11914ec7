use crate::baggage::BaggageSet;
use crate::error::TraceParentError;
use crate::trace::{IdGenerator, RandomIdGenerator, SpanId, TraceFlags, TraceId};
use std::fmt;

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;

/// Immutable identity of one span: where it sits in a trace and whether the
/// trace is sampled.
///
/// Children are derived from a parent with [`TraceContext::new_child`] and
/// friends; an identity is never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanIdentity {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    trace_flags: TraceFlags,
    trace_state: Option<String>,
}

impl SpanIdentity {
    /// Create a parentless identity.
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags) -> Self {
        SpanIdentity {
            trace_id,
            span_id,
            parent_span_id: None,
            trace_flags,
            trace_state: None,
        }
    }

    /// Returns a copy of this identity with the given parent span.
    pub fn with_parent(mut self, parent_span_id: SpanId) -> Self {
        self.parent_span_id = Some(parent_span_id);
        self
    }

    /// Returns a copy of this identity carrying an opaque `tracestate` value.
    ///
    /// Empty values are stored as `None`.
    pub fn with_trace_state<S: Into<String>>(mut self, trace_state: S) -> Self {
        let trace_state = trace_state.into();
        let trimmed = trace_state.trim();
        self.trace_state = if trimmed.is_empty() {
            None
        } else if trimmed.len() == trace_state.len() {
            Some(trace_state)
        } else {
            Some(trimmed.to_owned())
        };
        self
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of this span.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The span this one was derived from, if any.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// The W3C trace flags.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Shorthand for `trace_flags().is_sampled()`.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor `tracestate` carried alongside the identity, verbatim.
    pub fn trace_state(&self) -> Option<&str> {
        self.trace_state.as_deref()
    }

    /// Parses a W3C `traceparent` value.
    ///
    /// The returned identity describes the *remote* span: its `span_id` is
    /// the parent id from the header and it has no parent of its own. Only
    /// the sampled bit of the flags is kept.
    ///
    /// Rules: fields are fixed-width lowercase hex; version `ff` is invalid;
    /// version `00` has exactly four fields while later versions may append
    /// more; a single trailing `-` is ignored; trace and span ids must not be
    /// all zeros.
    ///
    /// # Examples
    ///
    /// ```
    /// use baggage_relay::trace::SpanIdentity;
    ///
    /// let remote = SpanIdentity::from_traceparent(
    ///     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
    /// )
    /// .unwrap();
    /// assert_eq!(remote.span_id().to_string(), "00f067aa0ba902b7");
    /// assert!(remote.is_sampled());
    ///
    /// assert!(SpanIdentity::from_traceparent("00-xyz").is_err());
    /// ```
    pub fn from_traceparent(header: &str) -> Result<Self, TraceParentError> {
        let parts: Vec<&str> = header.trim().split_terminator('-').collect();
        if parts.len() < 4 {
            return Err(TraceParentError::FieldCount(parts.len()));
        }

        let version = parts[0];
        if version.len() != 2 || !is_lower_hex(version) {
            return Err(TraceParentError::Version(version.to_owned()));
        }
        let version = u8::from_str_radix(version, 16)
            .map_err(|_| TraceParentError::Version(parts[0].to_owned()))?;
        if version > MAX_VERSION {
            return Err(TraceParentError::Version(parts[0].to_owned()));
        }
        if version == SUPPORTED_VERSION && parts.len() != 4 {
            return Err(TraceParentError::FieldCount(parts.len()));
        }

        let trace_id = parts[1];
        if trace_id.len() != 32 || !is_lower_hex(trace_id) {
            return Err(TraceParentError::TraceId(trace_id.to_owned()));
        }
        let trace_id = TraceId::from_hex(trace_id)
            .ok()
            .filter(TraceId::is_valid)
            .ok_or_else(|| TraceParentError::TraceId(parts[1].to_owned()))?;

        let span_id = parts[2];
        if span_id.len() != 16 || !is_lower_hex(span_id) {
            return Err(TraceParentError::SpanId(span_id.to_owned()));
        }
        let span_id = SpanId::from_hex(span_id)
            .ok()
            .filter(SpanId::is_valid)
            .ok_or_else(|| TraceParentError::SpanId(parts[2].to_owned()))?;

        let flags = parts[3];
        if flags.len() != 2 || !is_lower_hex(flags) {
            return Err(TraceParentError::Flags(flags.to_owned()));
        }
        let flags = u8::from_str_radix(flags, 16)
            .map_err(|_| TraceParentError::Flags(parts[3].to_owned()))?;

        Ok(SpanIdentity::new(
            trace_id,
            span_id,
            TraceFlags::new(flags) & TraceFlags::SAMPLED,
        ))
    }

    /// Formats this identity as a version `00` `traceparent` value.
    pub fn to_traceparent(&self) -> String {
        self.to_string()
    }

    fn child(&self, span_id: SpanId) -> Self {
        SpanIdentity {
            trace_id: self.trace_id,
            span_id,
            parent_span_id: Some(self.span_id),
            trace_flags: self.trace_flags,
            trace_state: self.trace_state.clone(),
        }
    }
}

impl fmt::Display for SpanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            self.trace_id,
            self.span_id,
            self.trace_flags & TraceFlags::SAMPLED
        )
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// A span identity together with the baggage that travels with it.
///
/// A `TraceContext` belongs to one logical operation and is handed around
/// explicitly. There is no ambient "current" context: code that needs one
/// takes it as an argument, and a clone is the only way to share it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    span: SpanIdentity,
    baggage: BaggageSet,
}

impl TraceContext {
    /// Combine an identity and a baggage set.
    pub fn new(span: SpanIdentity, baggage: BaggageSet) -> Self {
        TraceContext { span, baggage }
    }

    /// Start a new sampled trace with random ids and empty baggage.
    pub fn new_root() -> Self {
        TraceContext::new_root_with(&RandomIdGenerator::new(), TraceFlags::SAMPLED)
    }

    /// Start a new trace with ids from `ids`.
    pub fn new_root_with(ids: &dyn IdGenerator, flags: TraceFlags) -> Self {
        TraceContext {
            span: SpanIdentity::new(ids.new_trace_id(), ids.new_span_id(), flags),
            baggage: BaggageSet::new(),
        }
    }

    /// Derive a child with a fresh random span id.
    ///
    /// The child keeps the trace id, flags, trace state and a copy of the
    /// baggage; its parent is this context's span.
    pub fn new_child(&self) -> Self {
        self.child_with(&RandomIdGenerator::new())
    }

    /// Derive a child whose span id comes from `ids`.
    pub fn child_with(&self, ids: &dyn IdGenerator) -> Self {
        self.child_with_span_id(ids.new_span_id())
    }

    /// Derive a child with a known span id.
    pub fn child_with_span_id(&self, span_id: SpanId) -> Self {
        TraceContext {
            span: self.span.child(span_id),
            baggage: self.baggage.clone(),
        }
    }

    /// The span identity.
    pub fn span(&self) -> &SpanIdentity {
        &self.span
    }

    /// Shorthand for `span().trace_id()`.
    pub fn trace_id(&self) -> TraceId {
        self.span.trace_id
    }

    /// Shorthand for `span().span_id()`.
    pub fn span_id(&self) -> SpanId {
        self.span.span_id
    }

    /// The baggage.
    pub fn baggage(&self) -> &BaggageSet {
        &self.baggage
    }

    /// Mutable access to the baggage of this operation.
    ///
    /// Changes are local to this context; children made afterwards copy them.
    pub fn baggage_mut(&mut self) -> &mut BaggageSet {
        &mut self.baggage
    }

    /// Returns this context with its baggage replaced.
    pub fn with_baggage(mut self, baggage: BaggageSet) -> Self {
        self.baggage = baggage;
        self
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        TraceContext::new_root()
    }
}
