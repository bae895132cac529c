//! Realtime message model.
//!
//! A [`Message`] is a flat JSON object. The loop only cares about two of its fields: `type`,
//! which tags the event, and `call_id`, the correlation identifier attached to outbound
//! messages. Everything else is carried through untouched, in insertion order.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::error::Error;
use crate::ws::WsError;

/// Field holding the event type tag.
pub const TYPE_FIELD: &str = "type";

/// Field holding the outbound correlation identifier.
pub const CALL_ID_FIELD: &str = "call_id";

/// Type tag of keepalive messages.
pub const PING_TYPE: &str = "ping";

/// One realtime event, inbound or outbound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message carrying only a `type` field.
    #[must_use]
    pub fn with_type<S: Into<String>>(msg_type: S) -> Self {
        let mut message = Self::new();
        message.set(TYPE_FIELD, msg_type.into());
        message
    }

    /// The keepalive message.
    #[must_use]
    pub fn ping() -> Self {
        Self::with_type(PING_TYPE)
    }

    #[must_use]
    pub fn msg_type(&self) -> Option<&str> {
        self.0.get(TYPE_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.msg_type() == Some(PING_TYPE)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set `key` to `value`, returning the previous value if there was one.
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The correlation identifier, if present and a non-negative integer.
    #[must_use]
    pub fn call_id(&self) -> Option<u64> {
        self.0.get(CALL_ID_FIELD).and_then(Value::as_u64)
    }

    /// Whether a `call_id` field is present at all, whatever its value.
    #[must_use]
    pub fn has_call_id(&self) -> bool {
        self.0.contains_key(CALL_ID_FIELD)
    }

    pub fn set_call_id(&mut self, call_id: u64) {
        self.set(CALL_ID_FIELD, call_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Serialize to the wire text format.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<Map<String, Value>> for Message {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Message {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(WsError::InvalidMessage(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))
            .into()),
        }
    }
}

impl FromStr for Message {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(WsError::MessageParse)?;
        Self::try_from(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_keeps_field_order() {
        let message: Message = r#"{"type":"message","user":"U1","text":"hi","ts":"1.0"}"#
            .parse()
            .unwrap();

        let keys: Vec<&str> = message.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["type", "user", "text", "ts"]);
        assert_eq!(message.msg_type(), Some("message"));
        assert_eq!(
            message.to_json().unwrap(),
            r#"{"type":"message","user":"U1","text":"hi","ts":"1.0"}"#
        );
    }

    #[test]
    fn parse_rejects_non_object_payloads() {
        for text in ["[1,2]", "42", "\"hello\"", "null"] {
            let err = text.parse::<Message>().unwrap_err();
            assert!(
                matches!(err.downcast_ref::<WsError>(), Some(WsError::InvalidMessage(_))),
                "{text} should be rejected as a non-object"
            );
        }
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = "{not json".parse::<Message>().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::MessageParse(_))
        ));
    }

    #[test]
    fn ping_has_only_type() {
        let ping = Message::ping();

        assert!(ping.is_ping());
        assert_eq!(ping.len(), 1);
        assert!(!ping.has_call_id());
        assert_eq!(ping.to_json().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn call_id_round_trips_through_setter() {
        let mut message = Message::with_type("message");
        assert_eq!(message.call_id(), None);

        message.set_call_id(7);
        assert_eq!(message.call_id(), Some(7));
        assert_eq!(message.get(CALL_ID_FIELD), Some(&json!(7)));
    }

    #[test]
    fn non_numeric_call_id_is_present_but_not_numeric() {
        let message: Message = r#"{"type":"message","call_id":"abc"}"#.parse().unwrap();

        assert!(message.has_call_id());
        assert_eq!(message.call_id(), None);
    }

    #[test]
    fn set_and_remove_fields() {
        let mut message = Message::new();
        assert!(message.is_empty());

        assert_eq!(message.set("channel", "C1"), None);
        assert_eq!(message.set("channel", "C2"), Some(json!("C1")));
        assert!(message.contains_key("channel"));

        assert_eq!(message.remove("channel"), Some(json!("C2")));
        assert!(message.is_empty());
    }

    #[test]
    fn try_from_value_object() {
        let message = Message::try_from(json!({"type": "hello", "n": [1, 2]})).unwrap();

        assert_eq!(message.msg_type(), Some("hello"));
        assert_eq!(message.get("n"), Some(&json!([1, 2])));
    }
}
