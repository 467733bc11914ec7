//! # Context propagation
//!
//! Propagators read and write a [`TraceContext`] to and from the messages
//! exchanged between services. They never see a transport's own header type:
//! every carrier is wrapped in an [`Injector`] or [`Extractor`] that exposes
//! the logical keys `traceparent`, `tracestate` and `baggage` as strings.
//!
//! Carriers shipped with this crate:
//!
//! - `HashMap<String, String>`: text headers (keys stored lowercase).
//! - [`BinaryHeaders`]: byte-array valued headers, as message brokers
//!   deliver them.
//! - [`TypedProperties`]: object-valued application properties, where only
//!   string values carry context.
//! - `Option<E>`: `None` behaves as a carrier with no headers at all.
//!
//! HTTP and gRPC header maps are covered by the `baggage-relay-http` crate.
use crate::trace::TraceContext;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

mod baggage;
mod carrier;
mod trace_context;
mod w3c;

pub use baggage::BaggagePropagator;
pub use carrier::{BinaryHeaders, TypedProperties, DIAGNOSTIC_ID_PROPERTY};
pub use trace_context::TraceContextPropagator;
pub use w3c::W3cPropagator;

/// Header carrying the W3C trace parent.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Header carrying vendor-specific trace state.
pub const TRACESTATE_HEADER: &str = "tracestate";
/// Header carrying W3C baggage.
pub const BAGGAGE_HEADER: &str = "baggage";

/// Injector provides an interface for adding fields to an underlying carrier
/// like a `HashMap`.
pub trait Injector {
    /// Add a key and value to the underlying data, replacing any previous
    /// value for the key.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier like a `HashMap`.
pub trait Extractor {
    /// Get the string value for a key, if present and readable as text.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<Cow<'_, str>>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap, ignoring case.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(&key.to_lowercase())
            .or_else(|| {
                self.iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, value)| value)
            })
            .map(|v| Cow::Borrowed(v.as_str()))
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.keys()
            .map(|k| Cow::Borrowed(k.as_str()))
            .collect::<Vec<_>>()
    }
}

/// A missing carrier reads as one without any headers.
impl<E: Extractor> Extractor for Option<E> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.as_ref().and_then(|carrier| carrier.get(key))
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.as_ref().map(Extractor::keys).unwrap_or_default()
    }
}

impl<E: Extractor + ?Sized> Extractor for &E {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        (**self).get(key)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        (**self).keys()
    }
}

/// Methods to inject and extract a [`TraceContext`] as string key/value
/// pairs.
pub trait TextMapPropagator: fmt::Debug {
    /// Properly encodes the values of the [`TraceContext`] and injects them
    /// into the [`Injector`].
    ///
    /// Injection is a pure function of the context: it overwrites the keys
    /// it owns and never reads the carrier.
    fn inject_context(&self, cx: &TraceContext, injector: &mut dyn Injector);

    /// Retrieves encoded data using the provided [`Extractor`], layered on
    /// top of `cx`. If nothing usable is found, `cx` is returned unchanged.
    fn extract_with_context(&self, cx: &TraceContext, extractor: &dyn Extractor) -> TraceContext;

    /// Retrieves encoded data using the provided [`Extractor`], starting
    /// from a fresh root.
    fn extract(&self, extractor: &dyn Extractor) -> TraceContext {
        self.extract_with_context(&TraceContext::new_root(), extractor)
    }

    /// Returns iter of fields used by [`TextMapPropagator`]
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over fields of a [`TextMapPropagator`]
#[derive(Debug)]
pub struct FieldIter<'a>(std::slice::Iter<'a, &'static str>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of propagator fields
    pub fn new(fields: &'a [&'static str]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'static str;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().copied()
    }
}
