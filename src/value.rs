//! The tagged, JSON-compatible value used both on the wire and internally.
//!
//! `Array` and `Map` are stored behind an `Rc` rather than owned directly. That gives us the
//! "reference discipline" the source tracks with an explicit owned/mutable-borrow/const-borrow
//! byte for free: cloning a `Value` is always a shallow, aliasing `Rc::clone` (the const-borrow
//! view), and `as_array_mut`/`as_map_mut` use `Rc::make_mut` to get a uniquely-owned, writable
//! reference — copying only if the storage is still shared. This is exactly how the Publisher
//! shares a class-info `Map` across every property-update flush for a class without deep-copying
//! it per message.

use std::fmt;
use std::rc::Rc;

use crate::meta::Object;

/// An insertion-order-preserving string-keyed mapping. Order matters for JSON output, not for
/// lookup semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap(Vec<(String, Value)>);

impl ValueMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Array(Rc<Vec<Value>>),
    Map(Rc<ValueMap>),
    /// Never appears on the wire directly; the Publisher/Receiver wrap these into
    /// `{__QObject__: true, id, data?}` Maps before they ever reach the codec.
    Object(Object),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => false,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int32(i) => i64::from(*i),
            Value::Int64(i) => *i,
            Value::Float32(f) => *f as i64,
            Value::Float64(f) => *f as i64,
            _ => 0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int32(i) => f64::from(*i),
            Value::Int64(i) => *i as f64,
            Value::Float32(f) => f64::from(*f),
            Value::Float64(f) => *f,
            _ => 0.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::String(s) => s.as_str(),
            _ => "",
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get a uniquely-owned, writable view of the array, cloning the backing `Vec` only if
    /// another `Value` still shares it. Returns `None` if this isn't an `Array`.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(Rc::make_mut(a)),
            _ => None,
        }
    }

    /// See `as_array_mut`.
    pub fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Value::Map(m) => Some(Rc::make_mut(m)),
            _ => None,
        }
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn map(entries: ValueMap) -> Self {
        Value::Map(Rc::new(entries))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int64(i as i64)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float32(f)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::array(v.into_iter().map(Into::into).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Value::map(m)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_json(self))
    }
}

/// Decode a JSON document into a `Value`. Any malformed input decodes to `Null` rather than
/// surfacing an error, per the codec-failure policy.
pub fn from_json(text: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) => from_serde(v),
        Err(e) => {
            log::warn!("from_json: malformed JSON dropped: {}", e);
            Value::Null
        }
    }
}

/// Encode a `Value` as a JSON document. An `Object` variant that slipped through unwrapped is
/// encoded as `null` rather than panicking or erroring — it should never happen since the
/// Publisher/Receiver always wrap handles before they reach the codec, but the codec itself stays
/// defensive about it.
pub fn to_json(value: &Value) -> String {
    serde_json::to_string(&to_serde(value)).unwrap_or_else(|e| {
        log::warn!("to_json: serialization failed, emitting null: {}", e);
        "null".to_string()
    })
}

fn from_serde(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) {
                    Value::Int32(i as i32)
                } else {
                    Value::Int64(i)
                }
            } else {
                Value::Float64(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::array(items.into_iter().map(from_serde).collect())
        }
        serde_json::Value::Object(map) => {
            let mut out = ValueMap::new();
            for (k, v) in map {
                out.insert(k, from_serde(v));
            }
            Value::map(out)
        }
    }
}

fn to_serde(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::Value::from(*i),
        Value::Int64(i) => serde_json::Value::from(*i),
        Value::Float32(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Float64(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_serde).collect()),
        Value::Map(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map.iter() {
                out.insert(k.to_owned(), to_serde(v));
            }
            serde_json::Value::Object(out)
        }
        // ObjectHandle never appears on the wire directly; treat as Null rather than fail.
        Value::Object(_) => serde_json::Value::Null,
    }
}
