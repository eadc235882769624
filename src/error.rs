//! Result codes, the shared error envelope and the gateway error type.
//!
//! Every failure the gateway produces, whether it originates in routing,
//! validation, authorization or infrastructure, is rendered as the same
//! envelope JSON: `{"code": "ANT_CODE_...", "message": "...", "details": [...]}`
//! (`details` omitted when empty).

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::schema::json::CodecError;

/// Application result code carried by the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    BatchPartialFail,
}

impl ResultCode {
    /// Every code, in numeric order.
    pub const ALL: [ResultCode; 17] = [
        ResultCode::Ok,
        ResultCode::Cancelled,
        ResultCode::Unknown,
        ResultCode::InvalidArgument,
        ResultCode::DeadlineExceeded,
        ResultCode::NotFound,
        ResultCode::AlreadyExists,
        ResultCode::PermissionDenied,
        ResultCode::FailedPrecondition,
        ResultCode::Aborted,
        ResultCode::OutOfRange,
        ResultCode::Unimplemented,
        ResultCode::Internal,
        ResultCode::Unavailable,
        ResultCode::DataLoss,
        ResultCode::Unauthenticated,
        ResultCode::BatchPartialFail,
    ];

    /// Wire name, as it appears in envelope JSON.
    pub fn name(self) -> &'static str {
        match self {
            ResultCode::Ok => "ANT_CODE_OK",
            ResultCode::Cancelled => "ANT_CODE_CANCELLED",
            ResultCode::Unknown => "ANT_CODE_UNKNOWN",
            ResultCode::InvalidArgument => "ANT_CODE_INVALID_ARGUMENT",
            ResultCode::DeadlineExceeded => "ANT_CODE_DEADLINE_EXCEEDED",
            ResultCode::NotFound => "ANT_CODE_NOT_FOUND",
            ResultCode::AlreadyExists => "ANT_CODE_ALREADY_EXISTS",
            ResultCode::PermissionDenied => "ANT_CODE_PERMISSION_DENIED",
            ResultCode::FailedPrecondition => "ANT_CODE_FAILED_PRECONDITION",
            ResultCode::Aborted => "ANT_CODE_ABORTED",
            ResultCode::OutOfRange => "ANT_CODE_OUT_OF_RANGE",
            ResultCode::Unimplemented => "ANT_CODE_UNIMPLEMENTED",
            ResultCode::Internal => "ANT_CODE_INTERNAL",
            ResultCode::Unavailable => "ANT_CODE_UNAVAILABLE",
            ResultCode::DataLoss => "ANT_CODE_DATA_LOSS",
            ResultCode::Unauthenticated => "ANT_CODE_UNAUTHENTICATED",
            ResultCode::BatchPartialFail => "ANT_CODE_BATCH_PARTIAL_FAIL",
        }
    }

    /// Numeric value. 8 is unassigned.
    pub fn as_i32(self) -> i32 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::Cancelled => 1,
            ResultCode::Unknown => 2,
            ResultCode::InvalidArgument => 3,
            ResultCode::DeadlineExceeded => 4,
            ResultCode::NotFound => 5,
            ResultCode::AlreadyExists => 6,
            ResultCode::PermissionDenied => 7,
            ResultCode::FailedPrecondition => 9,
            ResultCode::Aborted => 10,
            ResultCode::OutOfRange => 11,
            ResultCode::Unimplemented => 12,
            ResultCode::Internal => 13,
            ResultCode::Unavailable => 14,
            ResultCode::DataLoss => 15,
            ResultCode::Unauthenticated => 16,
            ResultCode::BatchPartialFail => 17,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_i32() == value)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ResultCode::Ok)
    }

    /// HTTP status for this result code.
    pub fn http_status(self) -> StatusCode {
        match self {
            ResultCode::Ok | ResultCode::BatchPartialFail => StatusCode::OK,
            ResultCode::NotFound => StatusCode::NOT_FOUND,
            ResultCode::PermissionDenied => StatusCode::FORBIDDEN,
            ResultCode::AlreadyExists | ResultCode::Aborted => StatusCode::CONFLICT,
            ResultCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ResultCode::Internal | ResultCode::Unknown | ResultCode::DataLoss => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ResultCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ResultCode::InvalidArgument
            | ResultCode::FailedPrecondition
            | ResultCode::OutOfRange => StatusCode::BAD_REQUEST,
            ResultCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ResultCode::DeadlineExceeded | ResultCode::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

/// HTTP status for a raw numeric code. Unassigned numbers map to 500.
pub fn http_status_for(raw: i32) -> StatusCode {
    ResultCode::from_i32(raw)
        .map(ResultCode::http_status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ResultCode::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown result code {name}")))
    }
}

/// The shared error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ResultCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorEnvelope {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

/// Fixed body-validation messages.
pub const MSG_INPUT_EXPECTED: &str = "Invalid JSON: Input expected but not provided.";
pub const MSG_NO_INPUT_EXPECTED: &str = "Invalid JSON: No JSON data expected for this request.";
pub const MSG_OBJECT_EXPECTED: &str = "Invalid JSON: Expected a JSON object.";

/// Errors produced by the request/response pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No binding for the (verb, path).
    #[error("{0}")]
    Unimplemented(String),

    /// Pre-invocation authorization hook rejected the call.
    #[error("{0}")]
    Unavailable(String),

    /// Malformed or disallowed caller input.
    #[error("{0}")]
    InvalidArgument(String),

    /// Missing client, failed invocation, broken contract.
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> ResultCode {
        match self {
            GatewayError::Unimplemented(_) => ResultCode::Unimplemented,
            GatewayError::Unavailable(_) => ResultCode::Unavailable,
            GatewayError::InvalidArgument(_) => ResultCode::InvalidArgument,
            GatewayError::Internal(_) => ResultCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code().http_status()
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.code(), self.to_string())
    }
}

impl From<CodecError> for GatewayError {
    fn from(e: CodecError) -> Self {
        GatewayError::InvalidArgument(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.envelope())).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(ResultCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ResultCode::PermissionDenied.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ResultCode::AlreadyExists.http_status(), StatusCode::CONFLICT);
        assert_eq!(ResultCode::Aborted.http_status(), StatusCode::CONFLICT);
        assert_eq!(ResultCode::Unavailable.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ResultCode::DataLoss.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ResultCode::Unauthenticated.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ResultCode::OutOfRange.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ResultCode::Unimplemented.http_status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(ResultCode::Cancelled.http_status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(ResultCode::BatchPartialFail.http_status(), StatusCode::OK);
    }

    #[test]
    fn unassigned_numbers_map_to_500() {
        assert_eq!(http_status_for(8), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status_for(999), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status_for(-1), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status_for(5), StatusCode::NOT_FOUND);
    }

    #[test]
    fn names_round_trip() {
        for code in ResultCode::ALL {
            assert_eq!(ResultCode::from_name(code.name()), Some(code));
            assert_eq!(ResultCode::from_i32(code.as_i32()), Some(code));
        }
    }

    #[test]
    fn envelope_omits_empty_details() {
        let env = ErrorEnvelope::new(ResultCode::InvalidArgument, "Invalid JSON: x");
        assert_eq!(
            serde_json::to_string(&env).unwrap(),
            r#"{"code":"ANT_CODE_INVALID_ARGUMENT","message":"Invalid JSON: x"}"#
        );

        let mut env = env;
        env.details.push("field a".into());
        assert!(serde_json::to_string(&env).unwrap().contains("details"));
    }

    #[test]
    fn error_maps_to_envelope() {
        let err = GatewayError::Unavailable("denied".into());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.envelope().code, ResultCode::Unavailable);
        assert_eq!(err.envelope().message, "denied");
    }
}
