//! Telemetry attributes as seen by the sampling engine.
//!
//! The engine never owns the full telemetry payload; it receives a flat map
//! of attributes captured at the call site and inspects it read-only.

use std::collections::BTreeMap;

/// The URL of an HTTP request or dependency call.
pub const HTTP_URL: &str = "http.url";

/// The scheme component used to synthesize [`HTTP_URL`] when it is absent.
pub const HTTP_SCHEME: &str = "http.scheme";

/// The host component used to synthesize [`HTTP_URL`] when it is absent.
pub const HTTP_HOST: &str = "http.host";

/// The path-and-query component used to synthesize [`HTTP_URL`] when it is
/// absent.
pub const HTTP_TARGET: &str = "http.target";

/// Prefix of attributes holding HTTP request header values.
///
/// Header attributes carry string arrays, one element per header occurrence.
pub const REQUEST_HEADER_PREFIX: &str = "http.request.header.";

/// Prefix of attributes holding HTTP response header values.
pub const RESPONSE_HEADER_PREFIX: &str = "http.response.header.";

/// Attribute carrying the effective sampling percentage of a kept unit.
///
/// The exporter copies this onto the emitted item so that aggregation can
/// scale sampled counts back up, and propagation writes it into the outgoing
/// trace state for remote children.
pub const SAMPLE_RATE: &str = "beacon.sample_rate";

/// A single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// An array of strings, as used for HTTP header attributes.
    StringArray(Vec<String>),
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    I64(i64),
    /// A floating point value.
    F64(f64),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringArray(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringArray(value.into_iter().map(str::to_owned).collect())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

/// The attributes of one telemetry unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an attribute, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value for the given key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// Returns the value for the given key if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the value for the given key if it is a string array.
    pub fn get_str_array(&self, key: &str) -> Option<&[String]> {
        match self.0.get(key)? {
            AttributeValue::StringArray(values) => Some(values),
            _ => None,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Builds the URL of a server request from its parts.
///
/// Instrumentation does not always record [`HTTP_URL`] directly; when all of
/// scheme, host and target are present, the URL they form is equivalent.
/// Returns `None` if any part is missing.
pub fn synthesize_http_url(attributes: &Attributes) -> Option<String> {
    let scheme = attributes.get_str(HTTP_SCHEME)?;
    let host = attributes.get_str(HTTP_HOST)?;
    let target = attributes.get_str(HTTP_TARGET)?;
    Some(format!("{scheme}://{host}{target}"))
}
