//! # W3C Trace Context Propagator
//!
use crate::propagation::{
    Extractor, FieldIter, Injector, TextMapPropagator, TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
use crate::relay_debug;
use crate::trace::{IdGenerator, RandomIdGenerator, SpanIdentity, TraceContext};

static TRACE_CONTEXT_HEADER_FIELDS: [&str; 2] = [TRACEPARENT_HEADER, TRACESTATE_HEADER];

/// Propagates span identity in [W3C TraceContext] format under the
/// `traceparent` and `tracestate` headers.
///
/// The `traceparent` header represents the incoming request in a
/// tracing system in a common format, understood by all vendors.
/// Here's an example of a `traceparent` header.
///
/// `traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`
///
/// The `traceparent` HTTP header field identifies the incoming request in a
/// tracing system. It has four fields:
///
///    - version
///    - trace-id
///    - parent-id
///    - trace-flags
///
/// Extraction does not hand back the remote span. It starts a local child of
/// it: the trace id is kept, the remote span becomes the parent and a new span
/// id is drawn from this propagator's [`IdGenerator`].
///
/// The `tracestate` header is kept verbatim when a valid `traceparent` was
/// found and ignored otherwise.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Debug)]
pub struct TraceContextPropagator {
    id_generator: Box<dyn IdGenerator>,
}

impl Default for TraceContextPropagator {
    fn default() -> Self {
        TraceContextPropagator::new()
    }
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator` drawing random span ids.
    pub fn new() -> Self {
        TraceContextPropagator {
            id_generator: Box::new(RandomIdGenerator::new()),
        }
    }

    /// Use `id_generator` for the local span started on extraction.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// The generator used for local span ids.
    pub fn id_generator(&self) -> &dyn IdGenerator {
        self.id_generator.as_ref()
    }

    /// Extract the remote span identity from w3c trace-context headers.
    fn extract_remote(&self, extractor: &dyn Extractor) -> Option<SpanIdentity> {
        let header_value = extractor.get(TRACEPARENT_HEADER)?;
        let remote = match SpanIdentity::from_traceparent(&header_value) {
            Ok(remote) => remote,
            Err(err) => {
                relay_debug!(
                    name: "TraceContextPropagator.InvalidTraceparent",
                    reason = format!("{err}"),
                    value = &*header_value
                );
                return None;
            }
        };

        Some(match extractor.get(TRACESTATE_HEADER) {
            Some(trace_state) => remote.with_trace_state(trace_state.into_owned()),
            None => remote,
        })
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Writes `traceparent`, plus `tracestate` when the context carries one.
    fn inject_context(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        let span = cx.span();
        injector.set(TRACEPARENT_HEADER, span.to_traceparent());
        if let Some(trace_state) = span.trace_state() {
            injector.set(TRACESTATE_HEADER, trace_state.to_owned());
        }
    }

    /// Starts a local child of the remote span found in the `Extractor`,
    /// keeping the baggage of `cx`. If no valid `traceparent` is found, `cx`
    /// is returned unchanged.
    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext {
        match self.extract_remote(extractor) {
            Some(remote) => {
                TraceContext::new(remote, cx.baggage().clone()).child_with(self.id_generator())
            }
            None => cx.clone(),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&TRACE_CONTEXT_HEADER_FIELDS)
    }
}
