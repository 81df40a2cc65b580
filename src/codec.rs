//! Event payload codec
//!
//! Structured event data is a tree of `EventValue`s. It is serialized to
//! compact JSON with map keys in sorted order, so the same logical input
//! always yields the same bytes before encryption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// A single value inside an event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<EventValue>),
    Map(BTreeMap<String, EventValue>),
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for EventValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for EventValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<EventValue>> From<Vec<T>> for EventValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<EventValue>> From<Option<T>> for EventValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<EventData> for EventValue {
    fn from(data: EventData) -> Self {
        Self::Map(data.0)
    }
}

impl EventValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Top-level payload of an audit event: a mapping of field name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(BTreeMap<String, EventValue>);

impl EventData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<EventValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<EventValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&EventValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EventValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<EventValue>> FromIterator<(K, V)> for EventData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Serialize event data to its canonical byte form
pub fn encode(data: &EventData) -> AuditResult<Vec<u8>> {
    if let Some(key) = first_non_finite(data.iter()) {
        return Err(AuditError::Codec(format!(
            "Non-finite number in field '{}' has no canonical encoding",
            key
        )));
    }
    Ok(serde_json::to_vec(data)?)
}

/// Inverse of `encode` for successfully decrypted plaintext
pub fn decode(bytes: &[u8]) -> AuditResult<EventData> {
    Ok(serde_json::from_slice(bytes)?)
}

fn first_non_finite<'a>(
    mut fields: impl Iterator<Item = (&'a String, &'a EventValue)>,
) -> Option<String> {
    fields.find_map(|(key, value)| {
        if contains_non_finite(value) {
            Some(key.clone())
        } else {
            None
        }
    })
}

fn contains_non_finite(value: &EventValue) -> bool {
    match value {
        EventValue::Float(f) => !f.is_finite(),
        EventValue::List(items) => items.iter().any(contains_non_finite),
        EventValue::Map(map) => map.values().any(contains_non_finite),
        _ => false,
    }
}
