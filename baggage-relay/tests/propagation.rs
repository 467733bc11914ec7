use baggage_relay::correlation::CorrelationContext;
use baggage_relay::propagation::{
    BinaryHeaders, Extractor, TextMapPropagator, TypedProperties, W3cPropagator,
    DIAGNOSTIC_ID_PROPERTY,
};
use baggage_relay::trace::{SpanId, TraceId};
use baggage_relay::PropagatorConfig;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

fn propagator() -> W3cPropagator {
    W3cPropagator::new().with_config(
        PropagatorConfig::builder()
            .with_max_entries(64)
            .with_max_bytes(8192)
            .with_sample_new_roots(true)
            .build(),
    )
}

#[test]
fn remote_parent_and_baggage_are_extracted() {
    let headers = HashMap::from([
        ("traceparent".to_string(), TRACEPARENT.to_string()),
        (
            "baggage".to_string(),
            "tenant-id=acme%20corp,user-id=42".to_string(),
        ),
    ]);

    let cx = propagator().extract(&headers);

    assert_eq!(
        cx.trace_id(),
        TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
    );
    assert_eq!(
        cx.span().parent_span_id(),
        Some(SpanId::from_hex("00f067aa0ba902b7").unwrap())
    );
    assert_ne!(cx.span_id(), SpanId::from_hex("00f067aa0ba902b7").unwrap());
    assert_eq!(cx.baggage().get("tenant-id"), Some("acme corp"));
    assert_eq!(cx.baggage().get("user-id"), Some("42"));
    assert_eq!(cx.baggage().len(), 2);
    assert_eq!(
        CorrelationContext::from_baggage(cx.baggage()),
        Some(
            CorrelationContext::new()
                .with_tenant_id("acme corp")
                .with_user_id("42")
        )
    );
}

#[test]
fn missing_traceparent_starts_root_and_keeps_good_baggage() {
    let headers = HashMap::from([("baggage".to_string(), "a=1,bad,b=2".to_string())]);

    let cx = propagator().extract(&headers);

    assert!(cx.trace_id().is_valid());
    assert_eq!(cx.span().parent_span_id(), None);
    assert_eq!(
        cx.baggage().iter().collect::<Vec<_>>(),
        vec![("a", "1"), ("b", "2")]
    );
}

#[test]
fn no_carrier_yields_root() {
    let carrier: Option<HashMap<String, String>> = None;
    let cx = propagator().extract(&carrier);

    assert_eq!(cx.span().parent_span_id(), None);
    assert!(cx.baggage().is_empty());
}

#[test]
fn empty_baggage_is_not_injected() {
    let cx = propagator().extract(&HashMap::<String, String>::new());
    let mut headers: HashMap<String, String> = HashMap::new();
    propagator().inject_context(&cx, &mut headers);

    assert!(headers.contains_key("traceparent"));
    assert!(!headers.contains_key("baggage"));
    assert!(!headers.contains_key("tracestate"));
}

#[test]
fn context_survives_every_carrier_kind() {
    let propagator = propagator();
    let mut origin = propagator.extract(&HashMap::from([(
        "traceparent".to_string(),
        TRACEPARENT.to_string(),
    )]));
    CorrelationContext::new()
        .with_tenant_id("acme")
        .with_correlation_id("c-1")
        .with_user_id("u-9")
        .insert_into(origin.baggage_mut())
        .unwrap();

    // text headers -> binary headers
    let mut rpc: HashMap<String, String> = HashMap::new();
    propagator.inject_context(&origin, &mut rpc);
    let rpc_cx = propagator.extract(&rpc);

    let mut queue: HashMap<String, Vec<u8>> = HashMap::new();
    propagator.inject_context(&rpc_cx, &mut BinaryHeaders(&mut queue));
    let queue_cx = propagator.extract(&BinaryHeaders(&queue));

    // binary headers -> typed properties
    let mut properties: HashMap<String, Value> = HashMap::new();
    propagator.inject_context(
        &queue_cx,
        &mut TypedProperties::new(&mut properties).with_diagnostic_id(),
    );
    let bus_cx = propagator.extract(&TypedProperties::new(&properties));

    assert_eq!(bus_cx.trace_id(), origin.trace_id());
    assert_eq!(bus_cx.baggage(), origin.baggage());
    assert_eq!(
        CorrelationContext::from_baggage(bus_cx.baggage()),
        CorrelationContext::from_baggage(origin.baggage())
    );
    assert_eq!(
        properties[DIAGNOSTIC_ID_PROPERTY],
        properties["traceparent"]
    );

    // each hop is a child of the previous one
    assert_eq!(rpc_cx.span().parent_span_id(), Some(origin.span_id()));
    assert_eq!(queue_cx.span().parent_span_id(), Some(rpc_cx.span_id()));
    assert_eq!(bus_cx.span().parent_span_id(), Some(queue_cx.span_id()));
}

#[test]
fn non_string_properties_are_ignored() {
    let properties: HashMap<String, Value> = HashMap::from([
        ("traceparent".to_string(), json!({ "value": TRACEPARENT })),
        ("baggage".to_string(), json!("a=1")),
    ]);

    let cx = propagator().extract(&TypedProperties::new(&properties));

    assert_eq!(cx.span().parent_span_id(), None);
    assert_eq!(cx.baggage().get("a"), Some("1"));
}

#[test]
fn undecodable_binary_header_is_absent() {
    let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
    headers.insert("traceparent".to_string(), TRACEPARENT.as_bytes().to_vec());
    headers.insert("baggage".to_string(), vec![b'a', b'=', 0xff]);

    let carrier = BinaryHeaders(&headers);
    assert_eq!(carrier.get("baggage"), None);

    let cx = propagator().extract(&carrier);
    assert!(cx.span().parent_span_id().is_some());
    assert!(cx.baggage().is_empty());
}

#[test]
fn fields_cover_all_headers() {
    let fields: Vec<&str> = propagator().fields().collect();
    assert_eq!(fields, vec!["traceparent", "tracestate", "baggage"]);
}

proptest! {
    #[test]
    fn extract_always_yields_a_usable_context(
        traceparent in "\\PC{0,80}",
        tracestate in "\\PC{0,40}",
        baggage in "\\PC{0,120}",
    ) {
        let headers = HashMap::from([
            ("traceparent".to_string(), traceparent),
            ("tracestate".to_string(), tracestate),
            ("baggage".to_string(), baggage),
        ]);

        let cx = propagator().extract(&headers);

        prop_assert!(cx.trace_id().is_valid());
        prop_assert!(cx.span_id().is_valid());
        prop_assert!(cx.baggage().len() <= 64);
    }

    #[test]
    fn inject_then_extract_keeps_baggage(
        entries in proptest::collection::vec(("[a-z][a-z0-9-]{0,10}", "\\PC{0,20}"), 0..8),
    ) {
        let mut cx = propagator().extract(&HashMap::<String, String>::new());
        for (name, value) in entries {
            cx.baggage_mut().insert(name, value);
        }

        let mut headers: HashMap<String, String> = HashMap::new();
        propagator().inject_context(&cx, &mut headers);
        let received = propagator().extract(&headers);

        prop_assert_eq!(received.baggage(), cx.baggage());
        prop_assert_eq!(received.trace_id(), cx.trace_id());
    }
}
