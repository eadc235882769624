//! Message schema model.
//!
//! # Data Flow
//! ```text
//! Route binding (input/output MessageDescriptor)
//!     → json.rs (JSON ⇄ Message, driven by the descriptor)
//!     → message.rs (Message: the RPC runtime's native structure)
//!     → envelope.rs (built-in `ant.Result` error envelope)
//! ```
//!
//! # Design Decisions
//! - Descriptors are immutable and cheap to clone (shared `Arc`)
//! - Reserved fields are identified by name through a side-table
//!   ([`ReservedField`]); any leading underscore means internal-only
//! - The empty-message sentinel is a descriptor like any other; callers
//!   normalise it away once, at route registration

pub mod envelope;
pub mod json;
pub mod message;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use envelope::{envelope_descriptor, EMPTY_TYPE, ENVELOPE_TYPE};
pub use message::{Message, Value};

/// Field value types understood by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum(EnumDescriptor),
    Message(MessageDescriptor),
}

impl FieldType {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Enum(_) => "enum",
            FieldType::Message(_) => "message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Optional,
    Repeated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    pub cardinality: Cardinality,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_name(&self.name)
    }

    pub fn message_type(&self) -> Option<&MessageDescriptor> {
        match &self.ty {
            FieldType::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// Fields with a fixed, gateway-owned meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedField {
    /// Raw file payload (bytes), bypasses JSON in both directions.
    RawFile,
    /// Plaintext body override on output (string).
    Plaintext,
    /// Filename for downloads, or the uploaded file's name on input.
    Filename,
    /// Embedded error envelope.
    Result,
    CallerIp,
    CallerUsername,
    /// Streaming identifier (uint64).
    StreamId,
}

impl ReservedField {
    pub const ALL: [ReservedField; 7] = [
        ReservedField::RawFile,
        ReservedField::Plaintext,
        ReservedField::Filename,
        ReservedField::Result,
        ReservedField::CallerIp,
        ReservedField::CallerUsername,
        ReservedField::StreamId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReservedField::RawFile => "_raw_file",
            ReservedField::Plaintext => "_plaintext",
            ReservedField::Filename => "_filename",
            ReservedField::Result => "_result",
            ReservedField::CallerIp => "_caller_ip",
            ReservedField::CallerUsername => "_caller_username",
            ReservedField::StreamId => "_stream_id",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

/// Leading underscore marks a field as internal-only.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('_')
}

#[derive(Debug)]
struct EnumInner {
    full_name: String,
    values: Vec<(String, i32)>,
}

/// Enum type: ordered (name, number) pairs.
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    inner: Arc<EnumInner>,
}

impl EnumDescriptor {
    pub fn new<N: Into<String>>(full_name: impl Into<String>, values: impl IntoIterator<Item = (N, i32)>) -> Self {
        Self {
            inner: Arc::new(EnumInner {
                full_name: full_name.into(),
                values: values.into_iter().map(|(n, v)| (n.into(), v)).collect(),
            }),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.inner.full_name
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.inner.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.inner
            .values
            .iter()
            .find(|(_, v)| *v == number)
            .map(|(n, _)| n.as_str())
    }

    pub fn first(&self) -> Option<(&str, i32)> {
        self.inner.values.first().map(|(n, v)| (n.as_str(), *v))
    }
}

impl PartialEq for EnumDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.full_name == other.inner.full_name
    }
}

#[derive(Debug)]
struct MessageInner {
    full_name: String,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
}

/// Message type: named, ordered fields with lookup by name.
#[derive(Clone)]
pub struct MessageDescriptor {
    inner: Arc<MessageInner>,
}

impl MessageDescriptor {
    pub fn builder(full_name: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    /// The empty-message sentinel.
    pub fn empty() -> Self {
        Self::builder(EMPTY_TYPE).build()
    }

    pub fn full_name(&self) -> &str {
        &self.inner.full_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.inner.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.inner.index.get(name).map(|&i| &self.inner.fields[i])
    }

    pub fn reserved(&self, field: ReservedField) -> Option<&FieldDescriptor> {
        self.field(field.name())
    }

    pub fn has_reserved(&self, field: ReservedField) -> bool {
        self.reserved(field).is_some()
    }

    /// Fields a caller may set (no leading underscore).
    pub fn functional_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.inner.fields.iter().filter(|f| !f.is_reserved())
    }

    pub fn is_envelope(&self) -> bool {
        self.inner.full_name == ENVELOPE_TYPE
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.inner.full_name == EMPTY_TYPE
    }
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.full_name == other.inner.full_name
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Nested descriptors would otherwise print the whole type graph.
        f.debug_struct("MessageDescriptor")
            .field("full_name", &self.inner.full_name)
            .field(
                "fields",
                &self.inner.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub struct MessageBuilder {
    full_name: String,
    fields: Vec<FieldDescriptor>,
}

impl MessageBuilder {
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
            cardinality: Cardinality::Optional,
        });
        self
    }

    pub fn repeated(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
            cardinality: Cardinality::Repeated,
        });
        self
    }

    /// Add a reserved field with its canonical type.
    pub fn reserved(self, field: ReservedField) -> Self {
        let ty = match field {
            ReservedField::RawFile => FieldType::Bytes,
            ReservedField::Result => FieldType::Message(envelope_descriptor()),
            ReservedField::StreamId => FieldType::UInt64,
            ReservedField::Plaintext
            | ReservedField::Filename
            | ReservedField::CallerIp
            | ReservedField::CallerUsername => FieldType::String,
        };
        self.field(field.name(), ty)
    }

    /// Later declarations of the same name replace earlier ones.
    pub fn build(self) -> MessageDescriptor {
        let mut fields: Vec<FieldDescriptor> = Vec::with_capacity(self.fields.len());
        let mut index = HashMap::new();
        for field in self.fields {
            match index.get(&field.name) {
                Some(&i) => fields[i] = field,
                None => {
                    index.insert(field.name.clone(), fields.len());
                    fields.push(field);
                }
            }
        }
        MessageDescriptor {
            inner: Arc::new(MessageInner {
                full_name: self.full_name,
                fields,
                index,
            }),
        }
    }
}
