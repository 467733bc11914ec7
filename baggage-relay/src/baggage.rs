//! Primitives for sending name/value data across system boundaries.
//!
//! Baggage is a set of user-defined name/value pairs (tenant id, user id,
//! correlation id, ...) that travels next to the trace identity. It is carried
//! on the wire in the [W3C Baggage] format:
//!
//! ```text
//! baggage: tenant-id=acme%20corp,user-id=42
//! ```
//!
//! Main items in this module are:
//!
//! * [`BaggageSet`]: An insertion-ordered set of name/value pairs.
//! * [`encode`] / [`decode`]: The wire codec. Decoding is total: malformed
//!   segments are dropped one at a time, never the whole header.
//!
//! [W3C Baggage]: https://w3c.github.io/baggage
use crate::relay_debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

/// Everything outside the RFC 3986 unreserved set is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const ENTRY_DELIMITER: char = ',';
const KEY_VALUE_DELIMITER: char = '=';
const PROPERTY_DELIMITER: char = ';';

/// An insertion-ordered set of name/value pairs describing user-defined
/// properties.
///
/// Each name is associated with exactly one value. Writing an existing name
/// replaces its value in place, so the set round-trips through [`encode`] and
/// [`decode`] with its order intact.
///
/// Names must not be empty; values may be. Values are plain strings: callers
/// that need structure serialize it themselves (see
/// [`CorrelationContext`](crate::correlation::CorrelationContext)).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BaggageSet {
    entries: Vec<(String, String)>,
}

impl BaggageSet {
    /// Creates an empty `BaggageSet`.
    pub fn new() -> Self {
        BaggageSet {
            entries: Vec::new(),
        }
    }

    /// Returns the value associated with a given name.
    ///
    /// # Examples
    ///
    /// ```
    /// use baggage_relay::baggage::BaggageSet;
    ///
    /// let mut baggage = BaggageSet::new();
    /// baggage.insert("tenant-id", "acme");
    ///
    /// assert_eq!(baggage.get("tenant-id"), Some("acme"));
    /// assert_eq!(baggage.get("user-id"), None);
    /// ```
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&str> {
        let key = key.as_ref();
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Inserts a name/value pair.
    ///
    /// Returns the previous value if the name was already present. An empty
    /// name is ignored and `None` is returned.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if key.is_empty() {
            return None;
        }
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Sets or clears a name.
    ///
    /// `Some(value)` behaves like [`BaggageSet::insert`]; `None` removes the
    /// name, which is how a null baggage value is expressed.
    pub fn set<K, V>(&mut self, key: K, value: Option<V>) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        match value {
            Some(value) => self.insert(key, value),
            None => self.remove(key.into()),
        }
    }

    /// Removes a name, returning its value if it was present.
    pub fn remove<K: AsRef<str>>(&mut self, key: K) -> Option<String> {
        let key = key.as_ref();
        let index = self.entries.iter().position(|(name, _)| name == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }

    /// The number of bytes of all names and values, before encoding.
    pub fn content_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(name, value)| name.len() + value.len())
            .sum()
    }

    /// Encodes this set as a W3C `baggage` header value.
    pub fn to_header(&self) -> String {
        encode(self)
    }

    /// Decodes a W3C `baggage` header value. See [`decode`].
    pub fn from_header(header: &str) -> Self {
        decode(header)
    }
}

/// An iterator over the entries of a [`BaggageSet`].
#[derive(Debug)]
pub struct Iter<'a>(std::slice::Iter<'a, (String, String)>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.0
            .next()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<'a> IntoIterator for &'a BaggageSet {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.entries.iter())
    }
}

impl<K, V> FromIterator<(K, V)> for BaggageSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut baggage = BaggageSet::new();
        baggage.extend(iter);
        baggage
    }
}

impl<K, V> Extend<(K, V)> for BaggageSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl fmt::Display for BaggageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(
                f,
                "{}={}",
                utf8_percent_encode(name, COMPONENT),
                utf8_percent_encode(value, COMPONENT)
            )?;
        }
        Ok(())
    }
}

/// Encodes a set as `key1=value1,key2=value2`.
///
/// Names and values are percent-encoded independently, so neither can
/// contain a raw `,` or `=`. The empty set encodes to the empty string.
///
/// # Examples
///
/// ```
/// use baggage_relay::baggage::{encode, BaggageSet};
///
/// let baggage: BaggageSet = [("tenant-id", "acme corp"), ("filter", "a=1,b=2")]
///     .into_iter()
///     .collect();
///
/// assert_eq!(encode(&baggage), "tenant-id=acme%20corp,filter=a%3D1%2Cb%3D2");
/// assert_eq!(encode(&BaggageSet::new()), "");
/// ```
pub fn encode(baggage: &BaggageSet) -> String {
    baggage.to_string()
}

/// Decodes a `baggage` header value.
///
/// Segments are split on `,` and trimmed, then split on their first `=`.
/// Segments without `=`, with an empty name, with a malformed percent escape
/// or with invalid UTF-8 are dropped individually. W3C properties after a `;`
/// are discarded. Later duplicates overwrite earlier ones.
///
/// Headers from untrusted peers should go through [`decode_limited`] instead.
///
/// # Examples
///
/// ```
/// use baggage_relay::baggage::decode;
///
/// let baggage = decode("a=1,bad,b=2");
///
/// assert_eq!(baggage.len(), 2);
/// assert_eq!(baggage.get("a"), Some("1"));
/// assert_eq!(baggage.get("b"), Some("2"));
/// ```
pub fn decode(header: &str) -> BaggageSet {
    decode_limited(header, usize::MAX, usize::MAX)
}

/// Decodes a `baggage` header value, keeping at most `max_entries` entries
/// and `max_bytes` bytes of names and values.
///
/// Limits are applied while the header is read, in header order: once an
/// entry does not fit it is dropped and later entries may still fit. A
/// duplicate name replaces the kept value only if the result stays within
/// `max_bytes`. The work per segment is bounded by `max_entries`, so the cost
/// is linear in the header length.
///
/// # Examples
///
/// ```
/// use baggage_relay::baggage::decode_limited;
///
/// let baggage = decode_limited("a=1,b=2,c=3", 2, 8192);
///
/// assert_eq!(baggage.iter().collect::<Vec<_>>(), vec![("a", "1"), ("b", "2")]);
/// ```
pub fn decode_limited(header: &str, max_entries: usize, max_bytes: usize) -> BaggageSet {
    let mut baggage = BaggageSet::new();
    let mut bytes = 0usize;
    let mut dropped = 0usize;
    for segment in header.split(ENTRY_DELIMITER) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((name, value)) = decode_segment(segment) else {
            relay_debug!(
                name: "Baggage.Decode.SegmentDropped",
                segment = segment
            );
            continue;
        };
        let size = name.len() + value.len();
        let replaced = baggage
            .get(&name)
            .map(|existing| name.len() + existing.len());
        let fits = match replaced {
            Some(old) => (bytes - old).saturating_add(size) <= max_bytes,
            None => baggage.len() < max_entries && bytes.saturating_add(size) <= max_bytes,
        };
        if !fits {
            dropped += 1;
            continue;
        }
        bytes = bytes - replaced.unwrap_or(0) + size;
        baggage.insert(name, value);
    }
    if dropped > 0 {
        relay_debug!(
            name: "Baggage.Decode.LimitExceeded",
            dropped = dropped,
            max_entries = max_entries,
            max_bytes = max_bytes
        );
    }
    baggage
}

fn decode_segment(segment: &str) -> Option<(String, String)> {
    let (name, rest) = segment.split_once(KEY_VALUE_DELIMITER)?;
    let value = match rest.split_once(PROPERTY_DELIMITER) {
        Some((value, _properties)) => value,
        None => rest,
    };
    let name = decode_component(name.trim())?;
    if name.is_empty() {
        return None;
    }
    let value = decode_component(value.trim())?;
    Some((name, value))
}

/// Strict percent-decoding: every `%` must start a two-digit hex escape and
/// the result must be UTF-8.
fn decode_component(component: &str) -> Option<String> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    percent_decode_str(component)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}
