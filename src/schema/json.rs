//! Schema-driven JSON ⇄ [`Message`] conversion.
//!
//! # Conventions
//! - 64-bit integers and enums are written as JSON strings
//! - Decoding accepts numbers or strings for every numeric type
//! - Integers are parsed wide (`i128`) first, then range-checked, so
//!   negative or oversized input is rejected instead of wrapping
//! - Integer strings are taken as-is, like booleans: no surrounding whitespace
//! - Bytes are base64 (standard alphabet, URL-safe accepted on input)
//! - Unknown keys are an error; `null` means "unset"

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

use crate::schema::{FieldDescriptor, FieldType, Message, MessageDescriptor, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unknown field '{field}' for {message}")]
    UnknownField { message: String, field: String },

    #[error("Invalid value for field '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("Value '{value}' is out of range for field '{field}'")]
    OutOfRange { field: String, value: String },

    #[error("Invalid boolean '{value}' for field '{field}': expected true or false")]
    InvalidBool { field: String, value: String },

    #[error("Unknown enum value '{value}' for field '{field}'")]
    UnknownEnum { field: String, value: String },

    #[error("Invalid base64 data in field '{field}'")]
    InvalidBase64 { field: String },

    #[error("Field '{field}' of type {ty} cannot be set from a URL parameter")]
    UnsupportedParameter { field: String, ty: &'static str },
}

/// Decode a JSON object into a message of type `descriptor`.
pub fn decode_message(descriptor: &MessageDescriptor, json: &Json) -> Result<Message, CodecError> {
    let object = json.as_object().ok_or_else(|| CodecError::TypeMismatch {
        field: descriptor.full_name().to_string(),
        expected: "object",
    })?;

    let mut msg = Message::new(descriptor.clone());
    for (key, value) in object {
        let field = descriptor.field(key).ok_or_else(|| CodecError::UnknownField {
            message: descriptor.full_name().to_string(),
            field: key.clone(),
        })?;
        if value.is_null() {
            continue;
        }
        let decoded = decode_field(field, value)?;
        msg.set(key, decoded)?;
    }
    Ok(msg)
}

/// Decode one field value, honouring repeated cardinality.
pub fn decode_field(field: &FieldDescriptor, json: &Json) -> Result<Value, CodecError> {
    if field.is_repeated() {
        let items = json.as_array().ok_or_else(|| CodecError::TypeMismatch {
            field: field.name.clone(),
            expected: "array",
        })?;
        let values = items
            .iter()
            .map(|item| decode_scalar(field, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::List(values))
    } else {
        decode_scalar(field, json)
    }
}

fn decode_scalar(field: &FieldDescriptor, json: &Json) -> Result<Value, CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        field: field.name.clone(),
        expected: field.ty.type_name(),
    };

    match &field.ty {
        FieldType::Bool => match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) => parse_bool(&field.name, s).map(Value::Bool),
            _ => Err(mismatch()),
        },
        FieldType::Int32 => {
            let n = integer_of(field, json)?;
            i32::try_from(n)
                .map(Value::I32)
                .map_err(|_| out_of_range(field, n))
        }
        FieldType::UInt32 => {
            let n = integer_of(field, json)?;
            u32::try_from(n)
                .map(Value::U32)
                .map_err(|_| out_of_range(field, n))
        }
        FieldType::Int64 => {
            let n = integer_of(field, json)?;
            i64::try_from(n)
                .map(Value::I64)
                .map_err(|_| out_of_range(field, n))
        }
        FieldType::UInt64 => {
            let n = integer_of(field, json)?;
            u64::try_from(n)
                .map(Value::U64)
                .map_err(|_| out_of_range(field, n))
        }
        FieldType::Float => float_of(field, json).map(|f| Value::F32(f as f32)),
        FieldType::Double => float_of(field, json).map(Value::F64),
        FieldType::String => match json {
            Json::String(s) => Ok(Value::String(s.clone())),
            _ => Err(mismatch()),
        },
        FieldType::Bytes => match json {
            Json::String(s) => STANDARD
                .decode(s)
                .or_else(|_| URL_SAFE.decode(s))
                .map(|b| Value::Bytes(b.into()))
                .map_err(|_| CodecError::InvalidBase64 {
                    field: field.name.clone(),
                }),
            _ => Err(mismatch()),
        },
        FieldType::Enum(e) => match json {
            Json::String(s) => e.number_of(s).map(Value::Enum).ok_or_else(|| CodecError::UnknownEnum {
                field: field.name.clone(),
                value: s.clone(),
            }),
            Json::Number(n) => n
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Value::Enum)
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        FieldType::Message(m) => decode_message(m, json).map(Value::Message),
    }
}

pub(crate) fn parse_bool(field: &str, raw: &str) -> Result<bool, CodecError> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(CodecError::InvalidBool {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Parse an integer wide, leaving range checks to the caller.
pub(crate) fn parse_integer(field: &FieldDescriptor, raw: &str) -> Result<i128, CodecError> {
    raw.parse::<i128>().map_err(|_| CodecError::TypeMismatch {
        field: field.name.clone(),
        expected: field.ty.type_name(),
    })
}

pub(crate) fn out_of_range(field: &FieldDescriptor, n: i128) -> CodecError {
    CodecError::OutOfRange {
        field: field.name.clone(),
        value: n.to_string(),
    }
}

fn integer_of(field: &FieldDescriptor, json: &Json) -> Result<i128, CodecError> {
    match json {
        Json::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: field.ty.type_name(),
            }),
        Json::String(s) => parse_integer(field, s),
        _ => Err(CodecError::TypeMismatch {
            field: field.name.clone(),
            expected: field.ty.type_name(),
        }),
    }
}

fn float_of(field: &FieldDescriptor, json: &Json) -> Result<f64, CodecError> {
    let parsed = match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse::<f64>().ok(),
        },
        _ => None,
    };
    parsed.ok_or_else(|| CodecError::TypeMismatch {
        field: field.name.clone(),
        expected: field.ty.type_name(),
    })
}

/// Encode a message as a JSON object of its set fields.
pub fn encode_message(msg: &Message) -> Json {
    let descriptor = msg.descriptor();
    let mut object = Map::new();
    for (name, value) in msg.iter() {
        if let Some(field) = descriptor.field(name) {
            object.insert(name.to_string(), encode_value(field, value));
        }
    }
    Json::Object(object)
}

/// Encode one field value.
pub fn encode_value(field: &FieldDescriptor, value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::I32(n) => Json::from(*n),
        Value::U32(n) => Json::from(*n),
        Value::I64(n) => Json::String(n.to_string()),
        Value::U64(n) => Json::String(n.to_string()),
        Value::F32(f) => encode_float(f64::from(*f)),
        Value::F64(f) => encode_float(*f),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(STANDARD.encode(b)),
        Value::Enum(n) => match &field.ty {
            FieldType::Enum(e) => e
                .name_of(*n)
                .map(|name| Json::String(name.to_string()))
                .unwrap_or_else(|| Json::from(*n)),
            _ => Json::from(*n),
        },
        Value::Message(m) => encode_message(m),
        Value::List(items) => Json::Array(items.iter().map(|v| encode_value(field, v)).collect()),
    }
}

fn encode_float(f: f64) -> Json {
    match Number::from_f64(f) {
        Some(n) => Json::Number(n),
        None if f.is_nan() => Json::String("NaN".into()),
        None if f.is_sign_positive() => Json::String("Infinity".into()),
        None => Json::String("-Infinity".into()),
    }
}

/// JSON for a field that is not set.
pub fn default_json(field: &FieldDescriptor) -> Json {
    if field.is_repeated() {
        return Json::Array(Vec::new());
    }
    match &field.ty {
        FieldType::Bool => Json::Bool(false),
        FieldType::Int32 | FieldType::UInt32 => Json::from(0),
        FieldType::Int64 | FieldType::UInt64 => Json::String("0".into()),
        FieldType::Float | FieldType::Double => Json::from(0.0),
        FieldType::String | FieldType::Bytes => Json::String(String::new()),
        FieldType::Enum(e) => e
            .first()
            .map(|(name, _)| Json::String(name.to_string()))
            .unwrap_or_else(|| Json::from(0)),
        FieldType::Message(_) => Json::Object(Map::new()),
    }
}
