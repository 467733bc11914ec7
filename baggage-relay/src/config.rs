//! Propagator configuration.
use crate::relay_warn;
use std::env;
use std::str::FromStr;

/// Maximum number of baggage entries accepted on extraction.
pub(crate) const BAGGAGE_RELAY_MAX_ENTRIES: &str = "BAGGAGE_RELAY_MAX_ENTRIES";
/// Default maximum number of baggage entries.
pub(crate) const BAGGAGE_RELAY_MAX_ENTRIES_DEFAULT: usize = 64;
/// Maximum number of key and value bytes accepted on extraction.
pub(crate) const BAGGAGE_RELAY_MAX_BYTES: &str = "BAGGAGE_RELAY_MAX_BYTES";
/// Default maximum number of key and value bytes.
pub(crate) const BAGGAGE_RELAY_MAX_BYTES_DEFAULT: usize = 8192;
/// Whether roots started during extraction are sampled.
pub(crate) const BAGGAGE_RELAY_SAMPLE_NEW_ROOTS: &str = "BAGGAGE_RELAY_SAMPLE_NEW_ROOTS";
/// Default for new root sampling.
pub(crate) const BAGGAGE_RELAY_SAMPLE_NEW_ROOTS_DEFAULT: bool = true;

/// Limits and defaults applied by the propagators.
/// Use [`PropagatorConfigBuilder`] to configure your own instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropagatorConfig {
    /// Baggage entries beyond this count are dropped on extraction. The
    /// default is 64.
    pub(crate) max_entries: usize,

    /// Entries that would push the combined length of names and values past
    /// this many bytes are dropped on extraction. The default is 8192.
    pub(crate) max_bytes: usize,

    /// Flags used for the root started when no valid `traceparent` arrives.
    pub(crate) sample_new_roots: bool,
}

impl PropagatorConfig {
    /// Returns a builder initialised from defaults and the environment.
    pub fn builder() -> PropagatorConfigBuilder {
        PropagatorConfigBuilder::default()
    }

    /// Maximum number of baggage entries kept on extraction.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Maximum combined bytes of names and values kept on extraction.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Whether new roots are sampled.
    pub fn sample_new_roots(&self) -> bool {
        self.sample_new_roots
    }
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        PropagatorConfigBuilder::default().build()
    }
}

/// A builder for creating [`PropagatorConfig`] instances.
#[derive(Debug)]
pub struct PropagatorConfigBuilder {
    max_entries: usize,
    max_bytes: usize,
    sample_new_roots: bool,
}

impl Default for PropagatorConfigBuilder {
    /// Create a new [`PropagatorConfigBuilder`] initialized with default values.
    /// The values are overriden by environment variables if set.
    /// The supported environment variables are:
    /// * `BAGGAGE_RELAY_MAX_ENTRIES`
    /// * `BAGGAGE_RELAY_MAX_BYTES`
    /// * `BAGGAGE_RELAY_SAMPLE_NEW_ROOTS`
    fn default() -> Self {
        PropagatorConfigBuilder {
            max_entries: BAGGAGE_RELAY_MAX_ENTRIES_DEFAULT,
            max_bytes: BAGGAGE_RELAY_MAX_BYTES_DEFAULT,
            sample_new_roots: BAGGAGE_RELAY_SAMPLE_NEW_ROOTS_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl PropagatorConfigBuilder {
    /// Set the maximum number of baggage entries kept on extraction.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the maximum combined bytes of baggage names and values kept on
    /// extraction.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set whether roots started during extraction are sampled.
    pub fn with_sample_new_roots(mut self, sample_new_roots: bool) -> Self {
        self.sample_new_roots = sample_new_roots;
        self
    }

    /// Builds a `PropagatorConfig`.
    pub fn build(self) -> PropagatorConfig {
        PropagatorConfig {
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            sample_new_roots: self.sample_new_roots,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_entries) = parse_env::<usize>(BAGGAGE_RELAY_MAX_ENTRIES) {
            self.max_entries = max_entries;
        }

        if let Some(max_bytes) = parse_env::<usize>(BAGGAGE_RELAY_MAX_BYTES) {
            self.max_bytes = max_bytes;
        }

        if let Some(sample_new_roots) = parse_env::<bool>(BAGGAGE_RELAY_SAMPLE_NEW_ROOTS) {
            self.sample_new_roots = sample_new_roots;
        }

        self
    }
}

fn parse_env<T: FromStr>(variable: &'static str) -> Option<T> {
    let raw = env::var(variable).ok()?;
    match T::from_str(raw.trim()) {
        Ok(value) => Some(value),
        Err(_) => {
            relay_warn!(
                name: "Config.InvalidEnvVar",
                variable = variable,
                value = raw.as_str()
            );
            None
        }
    }
}
