use crate::propagation::{Extractor, Injector, TRACEPARENT_HEADER};
use crate::relay_debug;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::hash::BuildHasher;

/// Application property some message-bus consumers read instead of
/// `traceparent`.
pub const DIAGNOSTIC_ID_PROPERTY: &str = "Diagnostic-Id";

/// Exact match first, then an ASCII case-insensitive scan.
fn lookup<'m, V, S: BuildHasher>(map: &'m HashMap<String, V, S>, key: &str) -> Option<&'m V> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

/// Insert `key`, dropping any entry that differs from it only by case.
fn replace<V, S: BuildHasher>(map: &mut HashMap<String, V, S>, key: &str, value: V) {
    map.retain(|name, _| name == key || !name.eq_ignore_ascii_case(key));
    map.insert(key.to_owned(), value);
}

/// Carrier over byte-array valued headers, as delivered by message brokers
/// that do not type their header values.
///
/// Wrap a shared reference to read and a mutable reference to write:
///
/// ```
/// use baggage_relay::propagation::{BinaryHeaders, Extractor, Injector};
/// use std::collections::HashMap;
///
/// let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
/// BinaryHeaders(&mut headers).set("baggage", "tenant-id=acme".to_string());
/// assert_eq!(headers["baggage"], b"tenant-id=acme");
///
/// headers.insert("tracestate".to_string(), vec![0xff, 0xfe]);
/// assert_eq!(BinaryHeaders(&headers).get("baggage").as_deref(), Some("tenant-id=acme"));
/// assert_eq!(BinaryHeaders(&headers).get("tracestate"), None);
/// ```
///
/// Values that are not valid UTF-8 read as absent.
#[derive(Debug)]
pub struct BinaryHeaders<C>(pub C);

fn binary_get<'m, V, S>(map: &'m HashMap<String, V, S>, key: &str) -> Option<Cow<'m, str>>
where
    V: AsRef<[u8]>,
    S: BuildHasher,
{
    let bytes = lookup(map, key)?.as_ref();
    match std::str::from_utf8(bytes) {
        Ok(value) => Some(Cow::Borrowed(value)),
        Err(_) => {
            relay_debug!(name: "BinaryHeaders.InvalidUtf8", key = key);
            None
        }
    }
}

fn map_keys<V, S>(map: &HashMap<String, V, S>) -> Vec<Cow<'_, str>> {
    map.keys().map(|k| Cow::Borrowed(k.as_str())).collect()
}

impl<V, S> Extractor for BinaryHeaders<&HashMap<String, V, S>>
where
    V: AsRef<[u8]>,
    S: BuildHasher,
{
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        binary_get(self.0, key)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        map_keys(self.0)
    }
}

impl<V, S> Extractor for BinaryHeaders<&mut HashMap<String, V, S>>
where
    V: AsRef<[u8]>,
    S: BuildHasher,
{
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        binary_get(&*self.0, key)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        map_keys(&*self.0)
    }
}

impl<V, S> Injector for BinaryHeaders<&mut HashMap<String, V, S>>
where
    V: From<Vec<u8>>,
    S: BuildHasher,
{
    /// Stores the UTF-8 bytes of `value`.
    fn set(&mut self, key: &str, value: String) {
        replace(&mut *self.0, key, V::from(value.into_bytes()));
    }
}

/// Carrier over object-valued application properties.
///
/// Only [`Value::String`] entries carry context; a property of any other
/// type reads as absent. Writes always store a string.
///
/// With [`TypedProperties::with_diagnostic_id`], every `traceparent` write
/// is mirrored into [`DIAGNOSTIC_ID_PROPERTY`] for consumers that only
/// understand that property.
#[derive(Debug)]
pub struct TypedProperties<C> {
    properties: C,
    mirror_diagnostic_id: bool,
}

impl<C> TypedProperties<C> {
    /// Wrap a property map.
    pub fn new(properties: C) -> Self {
        TypedProperties {
            properties,
            mirror_diagnostic_id: false,
        }
    }

    /// Also write `traceparent` to [`DIAGNOSTIC_ID_PROPERTY`].
    pub fn with_diagnostic_id(mut self) -> Self {
        self.mirror_diagnostic_id = true;
        self
    }

    /// Unwrap the property map.
    pub fn into_inner(self) -> C {
        self.properties
    }
}

fn typed_get<'m, S: BuildHasher>(
    map: &'m HashMap<String, Value, S>,
    key: &str,
) -> Option<Cow<'m, str>> {
    match lookup(map, key)? {
        Value::String(value) => Some(Cow::Borrowed(value.as_str())),
        _ => {
            relay_debug!(name: "TypedProperties.NotAString", key = key);
            None
        }
    }
}

impl<S: BuildHasher> Extractor for TypedProperties<&HashMap<String, Value, S>> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        typed_get(self.properties, key)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        map_keys(self.properties)
    }
}

impl<S: BuildHasher> Extractor for TypedProperties<&mut HashMap<String, Value, S>> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        typed_get(&*self.properties, key)
    }

    fn keys(&self) -> Vec<Cow<'_, str>> {
        map_keys(&*self.properties)
    }
}

impl<S: BuildHasher> Injector for TypedProperties<&mut HashMap<String, Value, S>> {
    fn set(&mut self, key: &str, value: String) {
        if self.mirror_diagnostic_id && key.eq_ignore_ascii_case(TRACEPARENT_HEADER) {
            replace(
                &mut *self.properties,
                DIAGNOSTIC_ID_PROPERTY,
                Value::String(value.clone()),
            );
        }
        replace(&mut *self.properties, key, Value::String(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binary_round_trip_through_bytes() {
        let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
        BinaryHeaders(&mut headers).set("traceparent", "00-abc".to_string());

        assert_eq!(headers.get("traceparent").map(Vec::as_slice), Some(b"00-abc".as_slice()));
        assert_eq!(
            BinaryHeaders(&headers).get("traceparent"),
            Some(Cow::Borrowed("00-abc"))
        );
    }

    #[test]
    fn binary_invalid_utf8_is_absent() {
        let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
        headers.insert("baggage".to_string(), vec![0xc3, 0x28]);
        assert_eq!(BinaryHeaders(&headers).get("baggage"), None);
    }

    #[test]
    fn binary_lookup_prefers_exact_key() {
        let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
        headers.insert("Baggage".to_string(), b"a=1".to_vec());
        assert_eq!(BinaryHeaders(&headers).get("baggage").as_deref(), Some("a=1"));

        headers.insert("baggage".to_string(), b"b=2".to_vec());
        assert_eq!(BinaryHeaders(&headers).get("baggage").as_deref(), Some("b=2"));
    }

    #[test]
    fn binary_set_replaces_case_variants() {
        let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
        headers.insert("TraceParent".to_string(), b"old".to_vec());
        BinaryHeaders(&mut headers).set("traceparent", "new".to_string());

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["traceparent"], b"new");
    }

    #[test]
    fn binary_accepts_shared_byte_values() {
        let mut headers: HashMap<String, std::sync::Arc<[u8]>> = HashMap::new();
        BinaryHeaders(&mut headers).set("baggage", "a=1".to_string());
        assert_eq!(BinaryHeaders(&headers).get("baggage").as_deref(), Some("a=1"));
    }

    #[test]
    fn typed_reads_only_strings() {
        let properties: HashMap<String, Value> = HashMap::from([
            ("traceparent".to_string(), json!(42)),
            ("baggage".to_string(), json!("a=1")),
            ("tracestate".to_string(), Value::Null),
        ]);
        let carrier = TypedProperties::new(&properties);

        assert_eq!(carrier.get("traceparent"), None);
        assert_eq!(carrier.get("tracestate"), None);
        assert_eq!(carrier.get("BAGGAGE").as_deref(), Some("a=1"));
    }

    #[test]
    fn typed_writes_strings() {
        let mut properties: HashMap<String, Value> = HashMap::new();
        properties.insert("baggage".to_string(), json!(["stale"]));
        TypedProperties::new(&mut properties).set("baggage", "a=1".to_string());

        assert_eq!(properties["baggage"], json!("a=1"));
    }

    #[test]
    fn typed_mirrors_diagnostic_id() {
        let mut properties: HashMap<String, Value> = HashMap::new();
        let mut carrier = TypedProperties::new(&mut properties).with_diagnostic_id();
        carrier.set("traceparent", "00-abc".to_string());
        carrier.set("baggage", "a=1".to_string());

        let properties = carrier.into_inner();
        assert_eq!(properties[DIAGNOSTIC_ID_PROPERTY], json!("00-abc"));
        assert_eq!(properties["traceparent"], json!("00-abc"));
        assert_eq!(properties.len(), 3);
    }

    #[test]
    fn typed_without_mirror_skips_diagnostic_id() {
        let mut properties: HashMap<String, Value> = HashMap::new();
        TypedProperties::new(&mut properties).set("traceparent", "00-abc".to_string());
        assert!(!properties.contains_key(DIAGNOSTIC_ID_PROPERTY));
    }
}
