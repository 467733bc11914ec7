//! Id Generator
#[cfg(any(test, feature = "testing"))]
pub use increment::IncrementIdGenerator;

use crate::trace::{SpanId, TraceId};
use fnv::FnvHasher;
use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

/// Interface for generating IDs
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates Trace and Span ids using a random number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl RandomIdGenerator {
    /// Create a new `RandomIdGenerator`.
    pub fn new() -> Self {
        RandomIdGenerator { _private: () }
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| TraceId::from(rng.borrow_mut().random::<u128>()))
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| SpanId::from(rng.borrow_mut().random::<u64>()))
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

/// Deterministic [`IdGenerator`] for replayed workflow executions.
///
/// Every id is a pure function of the seed and a position in the sequence, so
/// two generators built from the same seed yield the same ids in the same
/// order, in any process and on any replay. Ids are FNV-1a hashes over
/// big-endian input, so they do not change across platforms or releases.
#[derive(Debug)]
pub struct ReplayIdGenerator {
    seed: u64,
    next: AtomicU64,
}

impl ReplayIdGenerator {
    /// Create a generator whose sequence is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        ReplayIdGenerator {
            seed,
            next: AtomicU64::new(0),
        }
    }

    /// Create a generator seeded from arbitrary byte parts, e.g. a workflow
    /// instance id and the persisted trace identity.
    pub fn from_parts<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = FnvHasher::default();
        for part in parts {
            // length prefix keeps ("ab", "c") and ("a", "bc") apart
            hasher.write(&(part.len() as u64).to_be_bytes());
            hasher.write(part);
        }
        ReplayIdGenerator::new(hasher.finish())
    }

    /// The seed this generator was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The span id at `position` in this generator's sequence.
    ///
    /// Does not advance the sequence used by [`IdGenerator::new_span_id`].
    pub fn span_id_at(&self, position: u64) -> SpanId {
        SpanId::from(non_zero(self.mix(b"span", position)))
    }

    /// The span id of step `ordinal` of a replayed workflow.
    ///
    /// Hashed in a different domain from [`ReplayIdGenerator::span_id_at`],
    /// so every `u64` ordinal is valid and none maps onto a sequence
    /// position.
    pub fn step_span_id(&self, ordinal: u64) -> SpanId {
        SpanId::from(non_zero(self.mix(b"step", ordinal)))
    }

    /// The trace id derived from the seed alone.
    pub fn trace_id(&self) -> TraceId {
        let high = self.mix(b"trace-high", 0) as u128;
        let low = self.mix(b"trace-low", 0) as u128;
        TraceId::from(non_zero_u128((high << 64) | low))
    }

    fn mix(&self, domain: &[u8], position: u64) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(&self.seed.to_be_bytes());
        hasher.write(domain);
        hasher.write(&position.to_be_bytes());
        hasher.finish()
    }
}

impl Clone for ReplayIdGenerator {
    /// The clone starts over at the beginning of the sequence.
    fn clone(&self) -> Self {
        ReplayIdGenerator::new(self.seed)
    }
}

impl IdGenerator for ReplayIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        self.trace_id()
    }

    fn new_span_id(&self) -> SpanId {
        self.span_id_at(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

fn non_zero(value: u64) -> u64 {
    if value == 0 {
        1
    } else {
        value
    }
}

fn non_zero_u128(value: u128) -> u128 {
    if value == 0 {
        1
    } else {
        value
    }
}

#[cfg(any(test, feature = "testing"))]
mod increment {
    use crate::trace::{IdGenerator, SpanId, TraceId};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    /// [`IdGenerator`] implementation that increments a counter for each new ID. This helps produce
    /// predictable IDs for testing.
    #[derive(Clone, Debug)]
    pub struct IncrementIdGenerator(Arc<AtomicU64>);

    impl IncrementIdGenerator {
        /// Create a new [`IncrementIdGenerator`]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Default for IncrementIdGenerator {
        fn default() -> Self {
            Self(Arc::new(AtomicU64::new(1)))
        }
    }

    impl IdGenerator for IncrementIdGenerator {
        fn new_trace_id(&self) -> TraceId {
            TraceId::from(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) as u128)
        }

        fn new_span_id(&self) -> SpanId {
            SpanId::from(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_differ() {
        let ids = RandomIdGenerator::new();
        assert_ne!(ids.new_trace_id(), ids.new_trace_id());
        assert_ne!(ids.new_span_id(), ids.new_span_id());
    }

    #[test]
    fn replay_sequence_is_reproducible() {
        let first = ReplayIdGenerator::from_parts([b"instance-1".as_slice(), b"trace".as_slice()]);
        let second = ReplayIdGenerator::from_parts([b"instance-1".as_slice(), b"trace".as_slice()]);

        let a: Vec<SpanId> = (0..5).map(|_| first.new_span_id()).collect();
        let b: Vec<SpanId> = (0..5).map(|_| second.new_span_id()).collect();
        assert_eq!(a, b);
        assert_eq!(first.new_trace_id(), second.new_trace_id());
        assert!(a.iter().all(SpanId::is_valid));
    }

    #[test]
    fn replay_positions_are_pure() {
        let ids = ReplayIdGenerator::new(7);
        let at_two = ids.span_id_at(2);
        ids.new_span_id();
        assert_eq!(ids.span_id_at(2), at_two);
        assert_ne!(ids.span_id_at(1), at_two);
    }

    #[test]
    fn step_ids_use_their_own_domain() {
        let ids = ReplayIdGenerator::new(7);
        assert_ne!(ids.step_span_id(0), ids.span_id_at(0));
        assert_eq!(ids.step_span_id(u64::MAX), ids.step_span_id(u64::MAX));
        assert_ne!(ids.step_span_id(u64::MAX), ids.step_span_id(0));
    }

    #[test]
    fn replay_seed_depends_on_part_boundaries() {
        let joined = ReplayIdGenerator::from_parts([b"ab".as_slice(), b"c".as_slice()]);
        let split = ReplayIdGenerator::from_parts([b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(joined.seed(), split.seed());
    }

    #[test]
    fn clone_restarts_sequence() {
        let ids = ReplayIdGenerator::new(42);
        let first = ids.new_span_id();
        let clone = ids.clone();
        assert_eq!(clone.new_span_id(), first);
    }

    #[test]
    fn increment_generator_is_predictable() {
        let ids = IncrementIdGenerator::new();
        assert_eq!(ids.new_trace_id(), TraceId::from(1));
        assert_eq!(ids.new_span_id(), SpanId::from(2));
    }
}
