//! Result-code extraction from RPC output messages.

use crate::error::ResultCode;
use crate::schema::envelope::raw_code;
use crate::schema::{Message, ReservedField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusProblem {
    /// The output type declares no envelope field.
    MissingEnvelope,
    /// The envelope's code could not be read.
    Unreadable,
}

/// The envelope carried by `msg`: the message itself when it is the
/// envelope type, else its `_result` field.
pub fn envelope_of(msg: &Message) -> Option<&Message> {
    if msg.descriptor().is_envelope() {
        return Some(msg);
    }
    msg.get_message(ReservedField::Result.name())
}

/// Raw numeric result code of an output message.
///
/// A declared but unset envelope reads as OK.
pub fn extract_code(msg: &Message) -> Result<i32, StatusProblem> {
    if msg.descriptor().is_envelope() {
        return raw_code(msg).ok_or(StatusProblem::Unreadable);
    }
    if !msg.descriptor().has_reserved(ReservedField::Result) {
        return Err(StatusProblem::MissingEnvelope);
    }
    match msg.get_message(ReservedField::Result.name()) {
        Some(envelope) => raw_code(envelope).ok_or(StatusProblem::Unreadable),
        None => Ok(ResultCode::Ok.as_i32()),
    }
}

/// Drop the embedded envelope from a successful GET response.
pub fn clear_envelope(msg: &mut Message) {
    if !msg.descriptor().is_envelope() {
        msg.clear(ReservedField::Result.name());
    }
}
