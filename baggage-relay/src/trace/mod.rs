//! Trace and span identity.
//!
//! A [`TraceContext`] is the unit that propagation moves around: a
//! [`SpanIdentity`] naming the current operation plus the
//! [`BaggageSet`](crate::baggage::BaggageSet) travelling with it.
//!
//! Ids are produced by an [`IdGenerator`]. Live code uses
//! [`RandomIdGenerator`]; replayed workflow code uses [`ReplayIdGenerator`],
//! whose output depends only on its seed.
mod context;
mod id_generator;
mod ids;

pub use context::{SpanIdentity, TraceContext};
#[cfg(any(test, feature = "testing"))]
pub use id_generator::IncrementIdGenerator;
pub use id_generator::{IdGenerator, RandomIdGenerator, ReplayIdGenerator};
pub use ids::{SpanId, TraceFlags, TraceId};
