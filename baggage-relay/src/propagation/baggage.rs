use crate::baggage;
use crate::config::PropagatorConfig;
use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator, BAGGAGE_HEADER};
use crate::trace::TraceContext;

static BAGGAGE_FIELDS: [&str; 1] = [BAGGAGE_HEADER];

/// Propagates name-value pairs in [W3C Baggage] format.
///
/// Extraction replaces the baggage of the base context with whatever the
/// `baggage` header holds; malformed segments are dropped one by one. The
/// entry and byte limits of [`PropagatorConfig`] are applied in header order,
/// so the first entries win.
///
/// # Examples
///
/// ```
/// use baggage_relay::propagation::{BaggagePropagator, TextMapPropagator};
/// use std::collections::HashMap;
///
/// // Example baggage value passed in externally via http headers
/// let mut headers = HashMap::new();
/// headers.insert("baggage".to_string(), "user-id=1".to_string());
///
/// let propagator = BaggagePropagator::new();
/// // can extract from any type that impls `Extractor`, usually an HTTP header map
/// let mut cx = propagator.extract(&headers);
/// assert_eq!(cx.baggage().get("user-id"), Some("1"));
///
/// // Change the baggage and pass it on
/// cx.baggage_mut().insert("server-id", "42");
/// propagator.inject_context(&cx, &mut headers);
///
/// assert_eq!(headers["baggage"], "user-id=1,server-id=42");
/// ```
///
/// [W3C Baggage]: https://w3c.github.io/baggage
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    config: PropagatorConfig,
}

impl BaggagePropagator {
    /// Construct a new baggage propagator with limits from the environment.
    pub fn new() -> Self {
        BaggagePropagator::default()
    }

    /// Use explicit limits.
    pub fn with_config(mut self, config: PropagatorConfig) -> Self {
        self.config = config;
        self
    }
}

impl TextMapPropagator for BaggagePropagator {
    /// Writes the `baggage` header unless the baggage is empty.
    fn inject_context(&self, cx: &TraceContext, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if !baggage.is_empty() {
            injector.set(BAGGAGE_HEADER, baggage::encode(baggage));
        }
    }

    /// Extracts a `TraceContext` with baggage values from an `Extractor`.
    /// Without a `baggage` header, `cx` is returned unchanged.
    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext {
        match extractor.get(BAGGAGE_HEADER) {
            Some(header_value) => {
                let decoded = baggage::decode_limited(
                    &header_value,
                    self.config.max_entries,
                    self.config.max_bytes,
                );
                cx.clone().with_baggage(decoded)
            }
            None => cx.clone(),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&BAGGAGE_FIELDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn extract(header: &str) -> TraceContext {
        let mut headers = HashMap::new();
        headers.insert(BAGGAGE_HEADER.to_string(), header.to_string());
        BaggagePropagator::new()
            .with_config(
                PropagatorConfig::builder()
                    .with_max_entries(64)
                    .with_max_bytes(8192)
                    .build(),
            )
            .extract(&headers)
    }

    #[rstest]
    #[case("key1=val1,key2=val2", vec![("key1", "val1"), ("key2", "val2")])]
    #[case("key1 =   val1,  key2 =val2   ", vec![("key1", "val1"), ("key2", "val2")])]
    #[case("key1=val1,key2=val2%2Cval3", vec![("key1", "val1"), ("key2", "val2,val3")])]
    #[case("key1=val1,key2=val2,a,val3", vec![("key1", "val1"), ("key2", "val2")])]
    #[case("key1=,key2=val2", vec![("key1", ""), ("key2", "val2")])]
    #[case("key1=val1;prop1=1,key2=val2", vec![("key1", "val1"), ("key2", "val2")])]
    fn extract_baggage(#[case] header: &str, #[case] expected: Vec<(&str, &str)>) {
        let cx = extract(header);
        assert_eq!(cx.baggage().iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn extract_replaces_base_baggage() {
        let mut base = TraceContext::new_root();
        base.baggage_mut().insert("stale", "1");
        let headers = HashMap::from([(BAGGAGE_HEADER.to_string(), "fresh=2".to_string())]);

        let cx = BaggagePropagator::new().extract_with_context(&base, &headers);

        assert_eq!(cx.baggage().get("stale"), None);
        assert_eq!(cx.baggage().get("fresh"), Some("2"));
        assert_eq!(cx.span(), base.span());
    }

    #[test]
    fn missing_header_keeps_base() {
        let mut base = TraceContext::new_root();
        base.baggage_mut().insert("kept", "1");
        let headers: HashMap<String, String> = HashMap::new();

        let cx = BaggagePropagator::new().extract_with_context(&base, &headers);
        assert_eq!(cx, base);
    }

    #[test]
    fn entry_limit_keeps_first_entries() {
        let header = (0..10).map(|i| format!("k{i}=v")).collect::<Vec<_>>().join(",");
        let headers = HashMap::from([(BAGGAGE_HEADER.to_string(), header)]);
        let propagator = BaggagePropagator::new()
            .with_config(PropagatorConfig::builder().with_max_entries(3).build());

        let cx = propagator.extract(&headers);
        let names: Vec<&str> = cx.baggage().iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["k0", "k1", "k2"]);
    }

    #[test]
    fn byte_limit_skips_oversized_entries() {
        let large = "x".repeat(100);
        let header = format!("a=1,big={large},b=2");
        let headers = HashMap::from([(BAGGAGE_HEADER.to_string(), header)]);
        let propagator = BaggagePropagator::new()
            .with_config(PropagatorConfig::builder().with_max_bytes(10).build());

        let cx = propagator.extract(&headers);
        assert_eq!(cx.baggage().iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn oversized_header_is_read_in_linear_time() {
        let header = (0..100_000)
            .map(|i| format!("k{i}=v"))
            .collect::<Vec<_>>()
            .join(",");
        let headers = HashMap::from([(BAGGAGE_HEADER.to_string(), header)]);
        let propagator = BaggagePropagator::new().with_config(
            PropagatorConfig::builder()
                .with_max_entries(64)
                .with_max_bytes(8192)
                .build(),
        );

        let started = std::time::Instant::now();
        let cx = propagator.extract(&headers);

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(cx.baggage().len(), 64);
        assert_eq!(cx.baggage().get("k0"), Some("v"));
        assert_eq!(cx.baggage().get("k63"), Some("v"));
        assert_eq!(cx.baggage().get("k64"), None);
    }

    #[test]
    fn duplicate_past_the_entry_limit_still_overwrites() {
        let headers = HashMap::from([(BAGGAGE_HEADER.to_string(), "a=1,b=2,c=3,a=4".to_string())]);
        let propagator = BaggagePropagator::new()
            .with_config(PropagatorConfig::builder().with_max_entries(2).build());

        let cx = propagator.extract(&headers);
        assert_eq!(cx.baggage().iter().collect::<Vec<_>>(), vec![("a", "4"), ("b", "2")]);
    }

    #[rstest]
    #[case(vec![("key1", "val1"), ("key2", "val2")], "key1=val1,key2=val2")]
    #[case(vec![("key1", "val1,val2"), ("key2", "val3=4")], "key1=val1%2Cval2,key2=val3%3D4")]
    #[case(vec![("tenant-id", "acme corp")], "tenant-id=acme%20corp")]
    fn inject_baggage(#[case] entries: Vec<(&str, &str)>, #[case] expected: &str) {
        let cx = TraceContext::new_root().with_baggage(entries.into_iter().collect());
        let mut injector: HashMap<String, String> = HashMap::new();
        BaggagePropagator::new().inject_context(&cx, &mut injector);

        assert_eq!(injector.get(BAGGAGE_HEADER).map(String::as_str), Some(expected));
    }

    #[test]
    fn inject_empty_baggage_writes_nothing() {
        let mut injector: HashMap<String, String> = HashMap::new();
        BaggagePropagator::new().inject_context(&TraceContext::new_root(), &mut injector);
        assert!(injector.is_empty());
    }

    #[test]
    fn fields() {
        let fields = BaggagePropagator::new().fields().collect::<Vec<_>>();
        assert_eq!(fields, vec![BAGGAGE_HEADER]);
    }
}
