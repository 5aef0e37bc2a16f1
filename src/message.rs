//! The typed JSON envelope exchanged between Publisher and Receiver: a `Value::Map` with a
//! mandatory `type` key and a fixed vocabulary of the rest.

use crate::value::{Value, ValueMap};

pub mod key {
    pub const TYPE: &str = "type";
    pub const ID: &str = "id";
    pub const DATA: &str = "data";
    pub const OBJECT: &str = "object";
    pub const DESTROYED: &str = "destroyed";
    pub const SIGNAL: &str = "signal";
    pub const METHOD: &str = "method";
    pub const ARGS: &str = "args";
    pub const PROPERTY: &str = "property";
    pub const VALUE: &str = "value";
    pub const SIGNALS: &str = "signals";
    pub const METHODS: &str = "methods";
    pub const PROPERTIES: &str = "properties";
    pub const ENUMS: &str = "enums";
    pub const CLASS: &str = "class";
    pub const QOBJECT_SENTINEL: &str = "__QObject__";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Invalid = 0,
    Signal = 1,
    PropertyUpdate = 2,
    Init = 3,
    Idle = 4,
    Debug = 5,
    InvokeMethod = 6,
    ConnectToSignal = 7,
    DisconnectFromSignal = 8,
    SetProperty = 9,
    Response = 10,
}

impl MessageType {
    fn from_i64(n: i64) -> Self {
        match n {
            1 => MessageType::Signal,
            2 => MessageType::PropertyUpdate,
            3 => MessageType::Init,
            4 => MessageType::Idle,
            5 => MessageType::Debug,
            6 => MessageType::InvokeMethod,
            7 => MessageType::ConnectToSignal,
            8 => MessageType::DisconnectFromSignal,
            9 => MessageType::SetProperty,
            10 => MessageType::Response,
            _ => MessageType::Invalid,
        }
    }
}

/// A message is just a `Value::Map` with a mandatory `type` key; this is a thin typed facade over
/// that map so call sites read `msg.object()` instead of `msg.get("object")`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message(ValueMap);

impl Message {
    pub fn new(message_type: MessageType) -> Self {
        let mut map = ValueMap::new();
        map.insert(key::TYPE, Value::Int32(message_type as i32));
        Message(map)
    }

    /// Build a `Message` from a raw decoded map, e.g. straight off the wire. `message_type()`
    /// reports `Invalid` if the `type` key is missing, non-numeric, or out of range — callers are
    /// expected to drop those with a warning rather than act on them.
    pub fn from_map(map: ValueMap) -> Self {
        Message(map)
    }

    pub fn into_value(self) -> Value {
        Value::map(self.0)
    }

    pub fn as_value(&self) -> Value {
        Value::map(self.0.clone())
    }

    pub fn message_type(&self) -> MessageType {
        match self.0.get(key::TYPE) {
            Some(Value::Int32(n)) => MessageType::from_i64(i64::from(*n)),
            Some(Value::Int64(n)) => MessageType::from_i64(*n),
            _ => MessageType::Invalid,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        match self.get(key::ID) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&str> {
        match self.get(key::OBJECT) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<usize> {
        self.get(key::SIGNAL).map(|v| v.as_i64() as usize)
    }

    pub fn method(&self) -> Option<usize> {
        self.get(key::METHOD).map(|v| v.as_i64() as usize)
    }

    pub fn property(&self) -> Option<usize> {
        self.get(key::PROPERTY).map(|v| v.as_i64() as usize)
    }

    pub fn args(&self) -> Vec<Value> {
        match self.get(key::ARGS) {
            Some(v) => v.as_array().map(|a| a.to_vec()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn data(&self) -> Option<&Value> {
        self.get(key::DATA)
    }
}

/// Build `{__QObject__: true, id, data?}`, the wire form of a wrapped/registered object reference.
pub fn qobject_reference(id: &str, class_info: Option<Value>) -> Value {
    let mut map = ValueMap::new();
    map.insert(key::QOBJECT_SENTINEL, Value::Bool(true));
    map.insert(key::ID, Value::from(id));
    if let Some(data) = class_info {
        map.insert(key::DATA, data);
    }
    Value::map(map)
}

/// True if `value` is a `{__QObject__: true, ...}` reference, the shape the Receiver watches for
/// on method-call responses.
pub fn is_qobject_reference(value: &Value) -> bool {
    value
        .as_map()
        .map(|m| matches!(m.get(key::QOBJECT_SENTINEL), Some(Value::Bool(true))))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_code_decodes_invalid() {
        let mut map = ValueMap::new();
        map.insert(key::TYPE, Value::Int32(99));
        assert_eq!(Message::from_map(map).message_type(), MessageType::Invalid);
    }

    #[test]
    fn missing_type_key_decodes_invalid() {
        let map = ValueMap::new();
        assert_eq!(Message::from_map(map).message_type(), MessageType::Invalid);
    }

    #[test]
    fn round_trips_known_type_codes() {
        for (code, expected) in [
            (1, MessageType::Signal),
            (2, MessageType::PropertyUpdate),
            (3, MessageType::Init),
            (4, MessageType::Idle),
            (5, MessageType::Debug),
            (6, MessageType::InvokeMethod),
            (7, MessageType::ConnectToSignal),
            (8, MessageType::DisconnectFromSignal),
            (9, MessageType::SetProperty),
            (10, MessageType::Response),
        ] {
            let mut map = ValueMap::new();
            map.insert(key::TYPE, Value::Int32(code));
            assert_eq!(Message::from_map(map).message_type(), expected);
        }
    }

    #[test]
    fn accessors_read_back_set_fields() {
        let mut msg = Message::new(MessageType::InvokeMethod);
        msg.set(key::ID, "7").set(key::OBJECT, "o").set(key::METHOD, 2i32);
        assert_eq!(msg.id(), Some("7"));
        assert_eq!(msg.object(), Some("o"));
        assert_eq!(msg.method(), Some(2));
    }

    #[test]
    fn qobject_reference_round_trips_through_is_qobject_reference() {
        let v = qobject_reference("abc", None);
        assert!(is_qobject_reference(&v));
        assert!(!is_qobject_reference(&Value::Int32(1)));
    }
}
