//! # Replay bridge
//!
//! Durable workflow engines persist an orchestration's input and re-run the
//! orchestration code from the top on every wake-up, possibly in another
//! process. Nothing ambient survives that, so the trace context has to ride
//! inside the persisted input and every id derived during replay has to be a
//! function of that input alone.
//!
//! - At enqueue time, [`WorkflowCheckpointInput::capture`] (or
//!   [`WorkflowCheckpointInput::enqueue`]) stores the context's W3C wire
//!   strings next to the business payload.
//! - At every replay, [`ReplayContext::rehydrate`] restores that context
//!   without touching a live carrier or a random source and derives the
//!   orchestration and step contexts from a [`ReplayIdGenerator`] seeded by
//!   the instance id and the persisted identity.
//!
//! Span start times are not part of the derivation, so a replay never
//! reproduces timing, only identity.
use crate::baggage::{self, BaggageSet};
use crate::error::Result;
use crate::propagation::{
    Extractor, Injector, TextMapPropagator, BAGGAGE_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
use crate::relay_debug;
use crate::trace::{ReplayIdGenerator, SpanIdentity, TraceContext, TraceFlags};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// The W3C wire strings of a context, as stored in workflow history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTraceContext {
    /// `traceparent` of the enqueuing context.
    pub traceparent: String,
    /// `tracestate`, when the enqueuing context had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracestate: Option<String>,
    /// `baggage`, when the enqueuing context had any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baggage: Option<String>,
}

impl PersistedTraceContext {
    /// Capture `cx` through `propagator`.
    pub fn capture(cx: &TraceContext, propagator: &dyn TextMapPropagator) -> Self {
        let mut persisted = PersistedTraceContext::default();
        propagator.inject_context(cx, &mut persisted);
        persisted
    }

    /// Rebuild the captured context.
    ///
    /// Unlike extraction, nothing is regenerated: the span id is the one that
    /// was captured and no baggage limits apply. The captured span's own
    /// parent is not part of the wire format, so the result has none.
    ///
    /// Fails with [`Error::TraceParent`](crate::Error::TraceParent) when the
    /// stored `traceparent` does not parse.
    pub fn restore(&self) -> Result<TraceContext> {
        let mut span = SpanIdentity::from_traceparent(&self.traceparent)?;
        if let Some(trace_state) = &self.tracestate {
            span = span.with_trace_state(trace_state.as_str());
        }
        let baggage = self
            .baggage
            .as_deref()
            .map(baggage::decode)
            .unwrap_or_default();
        Ok(TraceContext::new(span, baggage))
    }
}

impl Injector for PersistedTraceContext {
    /// Keeps the three W3C keys and ignores everything else.
    fn set(&mut self, key: &str, value: String) {
        if key.eq_ignore_ascii_case(TRACEPARENT_HEADER) {
            self.traceparent = value;
        } else if key.eq_ignore_ascii_case(TRACESTATE_HEADER) {
            self.tracestate = Some(value);
        } else if key.eq_ignore_ascii_case(BAGGAGE_HEADER) {
            self.baggage = Some(value);
        }
    }
}

impl Extractor for PersistedTraceContext {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        let value = if key.eq_ignore_ascii_case(TRACEPARENT_HEADER) {
            Some(self.traceparent.as_str()).filter(|v| !v.is_empty())
        } else if key.eq_ignore_ascii_case(TRACESTATE_HEADER) {
            self.tracestate.as_deref()
        } else if key.eq_ignore_ascii_case(BAGGAGE_HEADER) {
            self.baggage.as_deref()
        } else {
            None
        };
        value.map(Cow::Borrowed)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        [
            (TRACEPARENT_HEADER, !self.traceparent.is_empty()),
            (TRACESTATE_HEADER, self.tracestate.is_some()),
            (BAGGAGE_HEADER, self.baggage.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(key, _)| Cow::Borrowed(key))
        .collect()
    }
}

/// A workflow's persisted input: the business payload plus the context of
/// whoever enqueued it.
///
/// Histories written before context capture existed have no `traceContext`
/// field; they still deserialize and replay under a deterministic root.
///
/// # Examples
///
/// ```
/// use baggage_relay::propagation::W3cPropagator;
/// use baggage_relay::replay::{ReplayContext, WorkflowCheckpointInput};
/// use baggage_relay::trace::TraceContext;
///
/// let propagator = W3cPropagator::new();
/// let mut cx = TraceContext::new_root();
/// cx.baggage_mut().insert("tenant-id", "acme");
///
/// let history = WorkflowCheckpointInput::capture("order-17".to_string(), &cx, &propagator)
///     .to_json()
///     .unwrap();
///
/// // Later, in whichever process picks the orchestration up:
/// let input = WorkflowCheckpointInput::<String>::from_json(&history).unwrap();
/// let replay = ReplayContext::rehydrate("instance-1", &input);
/// assert_eq!(replay.orchestration().trace_id(), cx.trace_id());
/// assert_eq!(replay.orchestration().baggage().get("tenant-id"), Some("acme"));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCheckpointInput<T> {
    /// The business payload.
    pub payload: T,
    /// The enqueuing context, if it was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_context: Option<PersistedTraceContext>,
}

impl<T> WorkflowCheckpointInput<T> {
    /// An input without a captured context.
    pub fn new(payload: T) -> Self {
        WorkflowCheckpointInput {
            payload,
            trace_context: None,
        }
    }

    /// Embed `cx` next to `payload`.
    pub fn capture(payload: T, cx: &TraceContext, propagator: &dyn TextMapPropagator) -> Self {
        WorkflowCheckpointInput {
            payload,
            trace_context: Some(PersistedTraceContext::capture(cx, propagator)),
        }
    }

    /// Extract the triggering context from `extractor` once and embed it.
    ///
    /// Returns the extracted context so the caller can keep using it for the
    /// rest of the triggering operation.
    pub fn enqueue(
        payload: T,
        propagator: &dyn TextMapPropagator,
        extractor: &dyn Extractor,
    ) -> (TraceContext, Self) {
        let cx = propagator.extract(extractor);
        let input = WorkflowCheckpointInput::capture(payload, &cx, propagator);
        (cx, input)
    }
}

impl<T: Serialize> WorkflowCheckpointInput<T> {
    /// Serialize for the engine's history store.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<T: DeserializeOwned> WorkflowCheckpointInput<T> {
    /// Deserialize from the engine's history store.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Contexts re-derived for one orchestration replay.
#[derive(Debug)]
pub struct ReplayContext {
    instance_id: String,
    enqueued: Option<TraceContext>,
    orchestration: TraceContext,
    ids: ReplayIdGenerator,
    next_ordinal: u64,
}

impl ReplayContext {
    /// Re-derive the contexts of orchestration `instance_id` from its input.
    ///
    /// With a captured context, the orchestration context is a child of the
    /// enqueuing one. Without one, or if the captured `traceparent` does not
    /// parse, the orchestration runs under a root derived from the instance
    /// id alone, with empty baggage. That root is always sampled: sampling
    /// settings of the replaying process are not consulted. Either way the
    /// result depends only on `instance_id` and `input`.
    pub fn rehydrate<T>(instance_id: &str, input: &WorkflowCheckpointInput<T>) -> Self {
        let enqueued = input
            .trace_context
            .as_ref()
            .and_then(|persisted| match persisted.restore() {
                Ok(cx) => Some(cx),
                Err(err) => {
                    relay_debug!(
                        name: "ReplayContext.Rehydrate.InvalidTraceContext",
                        instance_id = instance_id,
                        reason = format!("{err}")
                    );
                    None
                }
            });

        let (ids, orchestration) = match &enqueued {
            Some(cx) => {
                let ids = ReplayIdGenerator::from_parts([
                    instance_id.as_bytes(),
                    cx.trace_id().to_bytes().as_slice(),
                    cx.span_id().to_bytes().as_slice(),
                ]);
                let orchestration = cx.child_with_span_id(ids.span_id_at(0));
                (ids, orchestration)
            }
            None => {
                let ids = ReplayIdGenerator::from_parts([instance_id.as_bytes()]);
                let span = SpanIdentity::new(ids.trace_id(), ids.span_id_at(0), TraceFlags::SAMPLED);
                (ids, TraceContext::new(span, BaggageSet::new()))
            }
        };

        ReplayContext {
            instance_id: instance_id.to_owned(),
            enqueued,
            orchestration,
            ids,
            next_ordinal: 0,
        }
    }

    /// The orchestration instance this context belongs to.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The restored enqueuing context, if one was captured and readable.
    pub fn enqueued(&self) -> Option<&TraceContext> {
        self.enqueued.as_ref()
    }

    /// The context of the orchestration itself.
    pub fn orchestration(&self) -> &TraceContext {
        &self.orchestration
    }

    /// The context for the step at `ordinal`, a child of the orchestration.
    ///
    /// Any `u64` is a valid ordinal.
    pub fn step(&self, ordinal: u64) -> TraceContext {
        self.orchestration
            .child_with_span_id(self.ids.step_span_id(ordinal))
    }

    /// The context for the next step in call order.
    ///
    /// The n-th call returns the same context as `step(n)`.
    pub fn next_step(&mut self) -> TraceContext {
        let cx = self.step(self.next_ordinal);
        self.next_ordinal = self.next_ordinal.wrapping_add(1);
        cx
    }
}
