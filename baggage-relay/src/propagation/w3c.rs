use crate::config::PropagatorConfig;
use crate::propagation::{
    BaggagePropagator, Extractor, FieldIter, Injector, TextMapPropagator, TraceContextPropagator,
    BAGGAGE_HEADER, TRACEPARENT_HEADER, TRACESTATE_HEADER,
};
use crate::trace::{IdGenerator, TraceContext, TraceFlags};

static W3C_FIELDS: [&str; 3] = [TRACEPARENT_HEADER, TRACESTATE_HEADER, BAGGAGE_HEADER];

/// The `traceparent`, `tracestate` and `baggage` headers handled together.
///
/// This is the propagator services use at their edges. Extraction always
/// yields a usable context:
///
/// - a valid `traceparent` gives a local child of the remote span,
/// - anything else gives a new root, sampled according to
///   [`PropagatorConfig::sample_new_roots`],
/// - the `baggage` header, if any, becomes the context's baggage.
///
/// # Examples
///
/// ```
/// use baggage_relay::propagation::{TextMapPropagator, W3cPropagator};
/// use std::collections::HashMap;
///
/// let propagator = W3cPropagator::new();
/// let headers = HashMap::from([
///     (
///         "traceparent".to_string(),
///         "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
///     ),
///     ("baggage".to_string(), "tenant-id=acme%20corp".to_string()),
/// ]);
///
/// let cx = propagator.extract(&headers);
/// assert_eq!(cx.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
/// assert_eq!(cx.baggage().get("tenant-id"), Some("acme corp"));
///
/// let mut outgoing: HashMap<String, String> = HashMap::new();
/// propagator.inject_context(&cx.new_child(), &mut outgoing);
/// assert_eq!(outgoing["baggage"], "tenant-id=acme%20corp");
/// ```
#[derive(Debug, Default)]
pub struct W3cPropagator {
    trace_context: TraceContextPropagator,
    baggage: BaggagePropagator,
    config: PropagatorConfig,
}

impl W3cPropagator {
    /// Create a propagator with random ids and limits from the environment.
    pub fn new() -> Self {
        W3cPropagator::default()
    }

    /// Use explicit configuration.
    pub fn with_config(mut self, config: PropagatorConfig) -> Self {
        self.baggage = BaggagePropagator::new().with_config(config.clone());
        self.config = config;
        self
    }

    /// Use `id_generator` for new roots and for the local span started on
    /// extraction.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.trace_context = self.trace_context.with_id_generator(id_generator);
        self
    }

    /// The configuration in effect.
    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    fn new_root(&self) -> TraceContext {
        let flags = if self.config.sample_new_roots {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::NOT_SAMPLED
        };
        TraceContext::new_root_with(self.trace_context.id_generator(), flags)
    }
}

impl TextMapPropagator for W3cPropagator {
    fn inject_context(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        self.trace_context.inject_context(cx, injector);
        self.baggage.inject_context(cx, injector);
    }

    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext {
        let cx = self.trace_context.extract_with_context(cx, extractor);
        self.baggage.extract_with_context(&cx, extractor)
    }

    /// Starts from a root built with this propagator's id generator and
    /// sampling default.
    fn extract(&self, extractor: &dyn Extractor) -> TraceContext {
        self.extract_with_context(&self.new_root(), extractor)
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&W3C_FIELDS)
    }
}
