// Stream event payloads and their wire encoding.
//
// An event is serialized exactly once per publish and the same string is
// enqueued to every subscriber. The wire form is JSON with a `type` tag;
// message bodies keep integers as integers and tolerate loosely-typed
// extra fields by stringifying anything that is not a scalar.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// All event types delivered over a room stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A newly persisted chat message.
    Message { message: MessagePayload },
}

impl StreamEvent {
    /// Encode to the wire string, sanitizing loosely-typed extras.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Message { message } => {
                let sanitized = Self::Message { message: message.clone().sanitized() };
                serde_json::to_string(&sanitized)
            }
        }
    }
}

/// The body of a `message` event.
///
/// Field set mirrors what clients render live: the persisted message id,
/// the display name (identity-reveal policy is decided upstream), raw
/// content, a millisecond epoch timestamp plus a pre-formatted display
/// time, and media-presence flags. `is_own` is always `false` on the
/// wire; the receiving client decides ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub id: i64,
    pub sender_name: String,
    pub content: String,
    /// Milliseconds since the Unix epoch. Zero means "unset"; publishers
    /// stamp it before encoding.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub formatted_time: String,
    #[serde(default)]
    pub has_image: bool,
    #[serde(default)]
    pub has_voice: bool,
    #[serde(default)]
    pub is_own: bool,
    /// Unknown payload fields are carried through rather than rejected.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessagePayload {
    /// Coerce extras to wire-safe scalars: non-primitive values become
    /// their JSON text, nulls are dropped.
    pub fn sanitized(mut self) -> Self {
        self.extra = self
            .extra
            .into_iter()
            .filter_map(|(key, value)| sanitize_scalar(value).map(|value| (key, value)))
            .collect();
        self
    }
}

fn sanitize_scalar(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => Some(value),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(Value::String(nested.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> MessagePayload {
        MessagePayload {
            id: 17,
            sender_name: "quiet_fox".to_owned(),
            content: "hello".to_owned(),
            timestamp: 1_700_000_000_000,
            formatted_time: "Nov 14, 2023 10:13 PM".to_owned(),
            has_image: false,
            has_voice: true,
            is_own: false,
            extra: Map::new(),
        }
    }

    #[test]
    fn encodes_with_type_tag_and_integer_fields() {
        let wire = StreamEvent::Message { message: payload() }.encode().expect("should encode");
        let value: Value = serde_json::from_str(&wire).expect("should be json");

        assert_eq!(value["type"], "message");
        assert_eq!(value["message"]["id"], 17);
        assert_eq!(value["message"]["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(value["message"]["has_voice"], true);
    }

    #[test]
    fn decodes_payload_with_unknown_fields_into_extra() {
        let raw = json!({
            "type": "message",
            "message": {
                "id": 1,
                "sender_name": "a",
                "content": "b",
                "timestamp": 5,
                "formatted_time": "t",
                "reply_to": 9
            }
        });

        let event: StreamEvent = serde_json::from_value(raw).expect("should decode");
        let StreamEvent::Message { message } = event;
        assert_eq!(message.extra["reply_to"], 9);
    }

    #[test]
    fn sanitize_stringifies_nested_values() {
        let mut message = payload();
        message.extra.insert("tags".to_owned(), json!(["a", "b"]));
        message.extra.insert("meta".to_owned(), json!({"k": 1}));

        let sanitized = message.sanitized();
        assert_eq!(sanitized.extra["tags"], json!("[\"a\",\"b\"]"));
        assert_eq!(sanitized.extra["meta"], json!("{\"k\":1}"));
    }

    #[test]
    fn sanitize_drops_nulls_and_keeps_scalars() {
        let mut message = payload();
        message.extra.insert("gone".to_owned(), Value::Null);
        message.extra.insert("kept".to_owned(), json!(3));

        let sanitized = message.sanitized();
        assert!(!sanitized.extra.contains_key("gone"));
        assert_eq!(sanitized.extra["kept"], 3);
    }

    #[test]
    fn encode_applies_sanitization() {
        let mut message = payload();
        message.extra.insert("attachments".to_owned(), json!([1, 2]));

        let wire = StreamEvent::Message { message }.encode().expect("should encode");
        let value: Value = serde_json::from_str(&wire).expect("should be json");
        assert_eq!(value["message"]["attachments"], "[1,2]");
    }
}
