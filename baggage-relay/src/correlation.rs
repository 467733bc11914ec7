//! Typed correlation record carried as a single baggage entry.
//!
//! Services that need the tenant, correlation and user id together keep them
//! in one JSON-valued entry, so they always travel and change as a unit.
//! Peers that send the three ids as loose `tenant-id`, `correlation-id` and
//! `user-id` entries are understood too.
use crate::baggage::BaggageSet;
use crate::error::Result;
use crate::relay_debug;
use serde::{Deserialize, Serialize};

/// Baggage key holding the JSON-encoded [`CorrelationContext`].
pub const CORRELATION_CONTEXT_KEY: &str = "correlation-context";

/// Older key for the same JSON record, still accepted on read.
pub const LEGACY_CORRELATION_CONTEXT_KEY: &str = "MyContext";

/// Loose baggage entry holding the tenant id.
pub const TENANT_ID_KEY: &str = "tenant-id";

/// Loose baggage entry holding the correlation id.
pub const CORRELATION_ID_KEY: &str = "correlation-id";

/// Loose baggage entry holding the user id.
pub const USER_ID_KEY: &str = "user-id";

/// Who a request is for and which business flow it belongs to.
///
/// Serialized with PascalCase field names:
///
/// ```
/// use baggage_relay::baggage::BaggageSet;
/// use baggage_relay::correlation::{CorrelationContext, CORRELATION_CONTEXT_KEY};
///
/// let record = CorrelationContext::new()
///     .with_tenant_id("acme")
///     .with_correlation_id("c-17");
///
/// let mut baggage = BaggageSet::new();
/// record.insert_into(&mut baggage).unwrap();
/// assert_eq!(
///     baggage.get(CORRELATION_CONTEXT_KEY),
///     Some(r#"{"TenantId":"acme","CorrelationId":"c-17"}"#)
/// );
/// assert_eq!(CorrelationContext::from_baggage(&baggage), Some(record));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorrelationContext {
    /// Tenant the request is served for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Business correlation id, stable across every hop of one flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Authenticated user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl CorrelationContext {
    /// An empty record.
    pub fn new() -> Self {
        CorrelationContext::default()
    }

    /// Set the tenant id.
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Reads the record from baggage.
    ///
    /// The JSON entry under [`CORRELATION_CONTEXT_KEY`] wins, then the one
    /// under [`LEGACY_CORRELATION_CONTEXT_KEY`], then the loose entries (see
    /// [`CorrelationContext::from_flat_baggage`]). An entry that is not a
    /// valid record is logged and skipped. Returns `None` when nothing
    /// usable is present.
    pub fn from_baggage(baggage: &BaggageSet) -> Option<Self> {
        [CORRELATION_CONTEXT_KEY, LEGACY_CORRELATION_CONTEXT_KEY]
            .into_iter()
            .find_map(|key| Self::from_json_entry(baggage, key))
            .or_else(|| Self::from_flat_baggage(baggage))
    }

    /// Reads the loose `tenant-id`, `correlation-id` and `user-id` entries.
    ///
    /// Returns `None` when none of them is present.
    ///
    /// ```
    /// use baggage_relay::baggage::decode;
    /// use baggage_relay::correlation::CorrelationContext;
    ///
    /// let baggage = decode("tenant-id=acme,user-id=42");
    /// let record = CorrelationContext::from_flat_baggage(&baggage).unwrap();
    ///
    /// assert_eq!(record.tenant_id.as_deref(), Some("acme"));
    /// assert_eq!(record.correlation_id, None);
    /// ```
    pub fn from_flat_baggage(baggage: &BaggageSet) -> Option<Self> {
        let record = CorrelationContext {
            tenant_id: baggage.get(TENANT_ID_KEY).map(str::to_owned),
            correlation_id: baggage.get(CORRELATION_ID_KEY).map(str::to_owned),
            user_id: baggage.get(USER_ID_KEY).map(str::to_owned),
        };
        (record != CorrelationContext::default()).then_some(record)
    }

    fn from_json_entry(baggage: &BaggageSet, key: &str) -> Option<Self> {
        let raw = baggage.get(key)?;
        match serde_json::from_str(raw) {
            Ok(record) => Some(record),
            Err(err) => {
                relay_debug!(
                    name: "CorrelationContext.InvalidEntry",
                    key = key,
                    reason = format!("{err}")
                );
                None
            }
        }
    }

    /// Writes the record to [`CORRELATION_CONTEXT_KEY`], replacing any
    /// previous record.
    pub fn insert_into(&self, baggage: &mut BaggageSet) -> Result<()> {
        let encoded = serde_json::to_string(self)?;
        baggage.insert(CORRELATION_CONTEXT_KEY, encoded);
        Ok(())
    }

    /// Writes the record as loose `tenant-id`, `correlation-id` and
    /// `user-id` entries. Unset fields remove their entry.
    pub fn insert_flat_into(&self, baggage: &mut BaggageSet) {
        baggage.set(TENANT_ID_KEY, self.tenant_id.as_deref());
        baggage.set(CORRELATION_ID_KEY, self.correlation_id.as_deref());
        baggage.set(USER_ID_KEY, self.user_id.as_deref());
    }
}
