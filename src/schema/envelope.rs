//! The built-in error envelope type and its conversions.

use std::sync::OnceLock;

use crate::error::{ErrorEnvelope, ResultCode};
use crate::schema::{EnumDescriptor, FieldType, Message, MessageDescriptor, Value};

pub const ENVELOPE_TYPE: &str = "ant.Result";
pub const EMPTY_TYPE: &str = "ant.Empty";

static ENVELOPE: OnceLock<MessageDescriptor> = OnceLock::new();

pub fn result_code_enum() -> EnumDescriptor {
    EnumDescriptor::new(
        "ant.ResultCode",
        ResultCode::ALL.iter().map(|c| (c.name(), c.as_i32())),
    )
}

/// `ant.Result { code, message, details[] }`
pub fn envelope_descriptor() -> MessageDescriptor {
    ENVELOPE
        .get_or_init(|| {
            MessageDescriptor::builder(ENVELOPE_TYPE)
                .field("code", FieldType::Enum(result_code_enum()))
                .field("message", FieldType::String)
                .repeated("details", FieldType::String)
                .build()
        })
        .clone()
}

impl ErrorEnvelope {
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new(envelope_descriptor());
        // Descriptor and values are both fixed here, so the setters cannot fail.
        let _ = msg.set("code", Value::Enum(self.code.as_i32()));
        let _ = msg.set("message", Value::String(self.message.clone()));
        if !self.details.is_empty() {
            let details = self.details.iter().cloned().map(Value::String).collect();
            let _ = msg.set("details", Value::List(details));
        }
        msg
    }
}

/// Raw numeric code of an envelope message. An unset code reads as OK.
pub fn raw_code(envelope: &Message) -> Option<i32> {
    if !envelope.descriptor().is_envelope() {
        return None;
    }
    match envelope.get("code") {
        Some(Value::Enum(n)) => Some(*n),
        None => Some(ResultCode::Ok.as_i32()),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_message_round_trip() {
        let env = ErrorEnvelope::new(ResultCode::NotFound, "gone");
        let msg = env.to_message();
        assert_eq!(raw_code(&msg), Some(5));
        assert_eq!(msg.get_str("message"), Some("gone"));
        assert!(!msg.is_set("details"));
    }

    #[test]
    fn unset_code_is_ok() {
        let msg = Message::new(envelope_descriptor());
        assert_eq!(raw_code(&msg), Some(0));
    }

    #[test]
    fn non_envelope_has_no_code() {
        let msg = Message::new(MessageDescriptor::empty());
        assert_eq!(raw_code(&msg), None);
    }
}
