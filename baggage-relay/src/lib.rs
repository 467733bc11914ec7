//! Carries trace identity and baggage across process boundaries: RPC calls,
//! message queues and durable workflow engines that replay their
//! orchestrations.
//!
//! # Overview
//!
//! A request enters a service with a `traceparent` and a `baggage` header.
//! The service extracts them into a [`TraceContext`], passes that value
//! explicitly through its own code, and injects it into every outbound call
//! or message. The wire format is W3C [Trace Context] and [Baggage]
//! throughout, whatever the transport:
//!
//! - text headers (`HashMap<String, String>`, and HTTP / gRPC header maps
//!   through the `baggage-relay-http` crate),
//! - byte-array headers ([`BinaryHeaders`](propagation::BinaryHeaders)),
//! - object-valued message properties
//!   ([`TypedProperties`](propagation::TypedProperties)),
//! - a workflow's persisted input
//!   ([`WorkflowCheckpointInput`](replay::WorkflowCheckpointInput)).
//!
//! There is no global "current" context. Concurrent handlers each own their
//! context, so one request's baggage can never leak into another's.
//!
//! Propagation never fails the surrounding operation: a malformed header
//! yields a fresh root or a dropped baggage entry, and the reason is reported
//! through `tracing` at debug level when the `internal-logs` feature is on.
//!
//! # Getting Started
//!
//! ```
//! use baggage_relay::correlation::CorrelationContext;
//! use baggage_relay::propagation::{BinaryHeaders, TextMapPropagator, W3cPropagator};
//! use std::collections::HashMap;
//!
//! let propagator = W3cPropagator::new();
//!
//! // Inbound HTTP request
//! let request_headers = HashMap::from([(
//!     "traceparent".to_string(),
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
//! )]);
//! let mut cx = propagator.extract(&request_headers);
//! CorrelationContext::new()
//!     .with_tenant_id("acme")
//!     .insert_into(cx.baggage_mut())
//!     .unwrap();
//!
//! // Publish a message with byte-array headers
//! let mut message_headers: HashMap<String, Vec<u8>> = HashMap::new();
//! propagator.inject_context(&cx.new_child(), &mut BinaryHeaders(&mut message_headers));
//!
//! // Consume it elsewhere
//! let consumed = propagator.extract(&BinaryHeaders(&message_headers));
//! assert_eq!(consumed.trace_id(), cx.trace_id());
//! assert_eq!(
//!     CorrelationContext::from_baggage(consumed.baggage()).and_then(|c| c.tenant_id),
//!     Some("acme".to_string())
//! );
//! ```
//!
//! # Crate Feature Flags
//!
//! * `internal-logs` (default): report dropped input through `tracing`.
//! * `testing`: expose [`IncrementIdGenerator`](trace::IncrementIdGenerator)
//!   for predictable ids in downstream tests.
//!
//! # Configuration
//!
//! Limits applied during extraction are read from the environment by
//! [`PropagatorConfig::default`]:
//!
//! | Variable | Default |
//! |---|---|
//! | `BAGGAGE_RELAY_MAX_ENTRIES` | `64` |
//! | `BAGGAGE_RELAY_MAX_BYTES` | `8192` |
//! | `BAGGAGE_RELAY_SAMPLE_NEW_ROOTS` | `true` |
//!
//! [Trace Context]: https://www.w3.org/TR/trace-context/
//! [Baggage]: https://w3c.github.io/baggage
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

mod internal_logging;

pub mod baggage;
pub mod config;
pub mod correlation;
pub mod error;
pub mod propagation;
pub mod replay;
pub mod trace;

pub use baggage::BaggageSet;
pub use config::{PropagatorConfig, PropagatorConfigBuilder};
pub use error::{Error, Result, TraceParentError};
pub use trace::{SpanIdentity, TraceContext};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, warn};
}
