//! Carriers that let `baggage-relay` propagators read and write
//! [`http::HeaderMap`] and, with the `grpc` feature, `tonic` request
//! metadata.
//!
//! ```
//! use baggage_relay::propagation::{TextMapPropagator, W3cPropagator};
//! use baggage_relay::TraceContext;
//! use baggage_relay_http::{HeaderExtractor, HeaderInjector};
//!
//! let propagator = W3cPropagator::new();
//! let mut cx = TraceContext::new_root();
//! cx.baggage_mut().insert("tenant-id", "acme");
//!
//! let mut headers = http::HeaderMap::new();
//! propagator.inject_context(&cx, &mut HeaderInjector(&mut headers));
//!
//! let received = propagator.extract(&HeaderExtractor(&headers));
//! assert_eq!(received.trace_id(), cx.trace_id());
//! assert_eq!(received.baggage().get("tenant-id"), Some("acme"));
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

use baggage_relay::propagation::{Extractor, Injector};
use baggage_relay::relay_debug;
use std::borrow::Cow;

/// Helper for injecting headers into HTTP Requests. This is used for
/// propagation when making outbound calls.
///
/// Keys or values that are not valid in an HTTP header are skipped.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Set a key and value in the HeaderMap.  Does nothing if the key or value are not valid inputs.
    fn set(&mut self, key: &str, value: String) {
        match (
            http::header::HeaderName::from_bytes(key.as_bytes()),
            http::header::HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(val)) => {
                self.0.insert(name, val);
            }
            _ => {
                relay_debug!(name: "HeaderInjector.InvalidHeader", key = key);
            }
        }
    }
}

/// Helper for extracting headers from HTTP Requests. This is used for
/// propagation when receiving inbound calls.
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap.  If the value is not valid ASCII, returns None.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.0
            .get(key)
            .and_then(|value| value.to_str().ok())
            .map(Cow::Borrowed)
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.0
            .keys()
            .map(|name| Cow::Borrowed(name.as_str()))
            .collect::<Vec<_>>()
    }
}

#[cfg(feature = "grpc")]
mod grpc {
    use super::*;
    use tonic::metadata::{KeyRef, MetadataKey, MetadataMap, MetadataValue};

    /// Injects context into outgoing gRPC request metadata.
    ///
    /// Keys or values that metadata cannot hold as ASCII are skipped.
    #[derive(Debug)]
    pub struct MetadataInjector<'a>(pub &'a mut MetadataMap);

    impl Injector for MetadataInjector<'_> {
        fn set(&mut self, key: &str, value: String) {
            match (
                MetadataKey::from_bytes(key.as_bytes()),
                MetadataValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(val)) => {
                    self.0.insert(name, val);
                }
                _ => {
                    relay_debug!(name: "MetadataInjector.InvalidEntry", key = key);
                }
            }
        }
    }

    /// Reads context from incoming gRPC request metadata.
    #[derive(Debug)]
    pub struct MetadataExtractor<'a>(pub &'a MetadataMap);

    impl Extractor for MetadataExtractor<'_> {
        fn get(&self, key: &str) -> Option<Cow<'_, str>> {
            self.0
                .get(key)
                .and_then(|value| value.to_str().ok())
                .map(Cow::Borrowed)
        }

        fn keys(&self) -> Vec<Cow<'_, str>> {
            self.0
                .keys()
                .map(|key| match key {
                    KeyRef::Ascii(name) => Cow::Borrowed(name.as_str()),
                    KeyRef::Binary(name) => Cow::Borrowed(name.as_str()),
                })
                .collect::<Vec<_>>()
        }
    }
}

#[cfg(feature = "grpc")]
pub use grpc::{MetadataExtractor, MetadataInjector};

#[cfg(test)]
mod tests {
    use super::*;
    use baggage_relay::propagation::{TextMapPropagator, W3cPropagator};
    use baggage_relay::TraceContext;

    #[test]
    fn http_headers_get() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("headerName", "value".to_string());

        assert_eq!(
            HeaderExtractor(&carrier).get("HEADERNAME").as_deref(),
            Some("value"),
            "case insensitive extraction"
        )
    }

    #[test]
    fn http_headers_keys() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("headerName1", "value1".to_string());
        HeaderInjector(&mut carrier).set("headerName2", "value2".to_string());

        let extractor = HeaderExtractor(&carrier);
        let got = extractor.keys();
        assert_eq!(got.len(), 2);
        assert!(got.contains(&Cow::Borrowed("headername1")));
        assert!(got.contains(&Cow::Borrowed("headername2")));
    }

    #[test]
    fn invalid_header_values_are_skipped() {
        let mut carrier = http::HeaderMap::new();
        HeaderInjector(&mut carrier).set("baggage", "a=1\r\nx-injected: 1".to_string());
        HeaderInjector(&mut carrier).set("bad header", "value".to_string());

        assert!(carrier.is_empty());
    }

    #[test]
    fn non_ascii_header_reads_as_absent() {
        let mut carrier = http::HeaderMap::new();
        carrier.insert(
            "baggage",
            http::header::HeaderValue::from_bytes(b"a=\xe9").unwrap(),
        );

        assert_eq!(HeaderExtractor(&carrier).get("baggage"), None);
    }

    #[test]
    fn propagator_round_trip_over_http_headers() {
        let propagator = W3cPropagator::new();
        let mut cx = TraceContext::new_root();
        cx.baggage_mut().insert("tenant-id", "acme corp");

        let mut headers = http::HeaderMap::new();
        propagator.inject_context(&cx, &mut HeaderInjector(&mut headers));
        let received = propagator.extract(&HeaderExtractor(&headers));

        assert_eq!(
            headers.get("baggage").and_then(|v| v.to_str().ok()),
            Some("tenant-id=acme%20corp")
        );
        assert_eq!(received.trace_id(), cx.trace_id());
        assert_eq!(received.span().parent_span_id(), Some(cx.span_id()));
        assert_eq!(received.baggage(), cx.baggage());
    }

    #[cfg(feature = "grpc")]
    #[test]
    fn grpc_metadata_round_trip() {
        let propagator = W3cPropagator::new();
        let mut cx = TraceContext::new_root();
        cx.baggage_mut().insert("user-id", "42");

        let mut metadata = tonic::metadata::MetadataMap::new();
        propagator.inject_context(&cx, &mut MetadataInjector(&mut metadata));

        let extractor = MetadataExtractor(&metadata);
        assert!(extractor.keys().contains(&Cow::Borrowed("traceparent")));

        let received = propagator.extract(&extractor);
        assert_eq!(received.trace_id(), cx.trace_id());
        assert_eq!(received.baggage().get("user-id"), Some("42"));
    }
}
