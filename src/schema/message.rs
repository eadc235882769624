//! Structured message values.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::schema::json::CodecError;
use crate::schema::{FieldDescriptor, FieldType, MessageDescriptor};

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    /// Shared buffer; cloning never copies the payload.
    Bytes(Bytes),
    /// Enum number.
    Enum(i32),
    Message(Message),
    List(Vec<Value>),
}

impl Value {
    /// True if this value is a legal element for `ty`.
    fn fits(&self, ty: &FieldType) -> bool {
        match (ty, self) {
            (FieldType::Bool, Value::Bool(_))
            | (FieldType::Int32, Value::I32(_))
            | (FieldType::Int64, Value::I64(_))
            | (FieldType::UInt32, Value::U32(_))
            | (FieldType::UInt64, Value::U64(_))
            | (FieldType::Float, Value::F32(_))
            | (FieldType::Double, Value::F64(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::Bytes, Value::Bytes(_))
            | (FieldType::Enum(_), Value::Enum(_)) => true,
            (FieldType::Message(expected), Value::Message(m)) => m.descriptor() == expected,
            _ => false,
        }
    }

    fn fits_field(&self, field: &FieldDescriptor) -> bool {
        match self {
            Value::List(items) if field.is_repeated() => items.iter().all(|v| v.fits(&field.ty)),
            _ if field.is_repeated() => false,
            v => v.fits(&field.ty),
        }
    }
}

/// An instance of a [`MessageDescriptor`]. Only set fields are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    descriptor: MessageDescriptor,
    values: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self {
            descriptor,
            values: BTreeMap::new(),
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// Set a field, checking it exists and the value kind matches.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), CodecError> {
        let field = self
            .descriptor
            .field(name)
            .ok_or_else(|| CodecError::UnknownField {
                message: self.descriptor.full_name().to_string(),
                field: name.to_string(),
            })?;
        if !value.fits_field(field) {
            return Err(CodecError::TypeMismatch {
                field: name.to_string(),
                expected: field.ty.type_name(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: &str, value: Value) -> Result<Self, CodecError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Set fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bytes(&self, name: &str) -> Option<&Bytes> {
        match self.values.get(name) {
            Some(Value::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(Value::U64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_message(&self, name: &str) -> Option<&Message> {
        match self.values.get(name) {
            Some(Value::Message(m)) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReservedField;

    fn desc() -> MessageDescriptor {
        MessageDescriptor::builder("t.Msg")
            .field("flag", FieldType::Bool)
            .repeated("ids", FieldType::UInt32)
            .reserved(ReservedField::RawFile)
            .build()
    }

    #[test]
    fn set_checks_kind() {
        let mut m = Message::new(desc());
        assert!(m.set("flag", Value::Bool(true)).is_ok());
        assert!(matches!(
            m.set("flag", Value::I32(1)),
            Err(CodecError::TypeMismatch { .. })
        ));
        assert!(matches!(
            m.set("missing", Value::Bool(true)),
            Err(CodecError::UnknownField { .. })
        ));
    }

    #[test]
    fn repeated_requires_list() {
        let mut m = Message::new(desc());
        assert!(m.set("ids", Value::U32(1)).is_err());
        assert!(m.set("ids", Value::List(vec![Value::U32(1), Value::U32(2)])).is_ok());
        assert!(m.set("ids", Value::List(vec![Value::I32(1)])).is_err());
    }

    #[test]
    fn bytes_are_shared_not_copied() {
        let body = Bytes::from_static(b"payload");
        let m = Message::new(desc())
            .with("_raw_file", Value::Bytes(body.clone()))
            .unwrap();
        let stored = m.get_bytes("_raw_file").unwrap();
        assert_eq!(stored.as_ptr(), body.as_ptr());
    }
}
