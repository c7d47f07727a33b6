//! Header sets exchanged with bare clients.
//!
//! A [`HeaderSet`] is an ordered mapping from lowercase header name to a
//! single value or a list of values. It serializes as a JSON object and is
//! always constructed empty, so the only entries it holds are the ones a
//! request or response actually carried.

use std::fmt;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bare::error::TunnelError;

/// Prefix reserved for bare control headers.
pub const CONTROL_PREFIX: &str = "x-bare-";

/// Returns true for `x-bare-*` names, which are metadata and never forwarded.
pub fn is_control_header(name: &str) -> bool {
    name.as_bytes()
        .get(..CONTROL_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CONTROL_PREFIX.as_bytes()))
}

/// A header value: one string, or every value of a repeated header in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BareHeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl BareHeaderValue {
    /// Iterate the individual values.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        };
        slice.iter().map(String::as_str)
    }

    /// Join into a single header slot.
    pub fn flatten(&self) -> String {
        match self {
            Self::Single(value) => value.clone(),
            Self::Multiple(values) => values.join(", "),
        }
    }
}

impl From<&str> for BareHeaderValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for BareHeaderValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for BareHeaderValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// Join a header value for transport in a single header slot.
pub fn flatten(value: &BareHeaderValue) -> String {
    value.flatten()
}

/// Ordered header name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, BareHeaderValue)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&BareHeaderValue> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Insert or replace a header. A replaced header keeps its position.
    pub fn insert(
        &mut self,
        name: impl AsRef<str>,
        value: impl Into<BareHeaderValue>,
    ) -> Option<BareHeaderValue> {
        let name = name.as_ref();
        let value = value.into();
        match self.position(name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((name.to_ascii_lowercase(), value));
                None
            }
        }
    }

    /// Drop every `x-bare-*` entry, returning how many were removed.
    pub fn strip_control_headers(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(name, _)| !is_control_header(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BareHeaderValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Build the outbound header map. Lists become repeated headers.
    pub fn to_header_map(&self) -> Result<HeaderMap, TunnelError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TunnelError::protocol(format!("invalid header name {name:?}")))?;
            for value in value.values() {
                let header_value = HeaderValue::from_str(value).map_err(|_| {
                    TunnelError::protocol(format!("invalid value for header {name:?}"))
                })?;
                map.append(header_name.clone(), header_value);
            }
        }
        Ok(map)
    }
}

impl Serialize for HeaderSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HeaderSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeaderSetVisitor;

        impl<'de> Visitor<'de> for HeaderSetVisitor {
            type Value = HeaderSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of header names to strings or string arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<HeaderSet, A::Error> {
                let mut set = HeaderSet::new();
                while let Some((name, value)) = access.next_entry::<String, BareHeaderValue>()? {
                    set.insert(name, value);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(HeaderSetVisitor)
    }
}

/// Rebuild a response header set in the order names first appeared on the
/// wire, grouping repeated names into one list-valued entry.
pub fn normalize_response_headers(headers: &HeaderMap) -> HeaderSet {
    let mut set = HeaderSet::new();
    for name in headers.keys() {
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        let value = if values.len() == 1 {
            BareHeaderValue::Single(values.remove(0))
        } else {
            BareHeaderValue::Multiple(values)
        };
        set.insert(name.as_str(), value);
    }
    set
}
