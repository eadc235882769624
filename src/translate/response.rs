//! RPC output → HTTP response.
//!
//! # Responsibilities
//! - Map the envelope's result code to an HTTP status
//! - Pick the body: plaintext override, raw file download, or JSON
//! - Hand streaming responses over to the stream manager
//!
//! # Design Decisions
//! - Non-OK statuses return only the envelope, never partial data
//! - An output type with a single functional field is unwrapped to that
//!   field's bare JSON value
//! - A failed call drops the request's stream reservation, which releases it

use axum::http::header::CONTENT_DISPOSITION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde_json::{json, Value as Json};

use crate::error::{http_status_for, GatewayError};
use crate::routing::HttpVerb;
use crate::rpc::RpcStatus;
use crate::schema::json::{default_json, encode_message, encode_value};
use crate::schema::{Message, ReservedField};
use crate::translate::status::{clear_envelope, envelope_of, extract_code};
use crate::translate::{GatewayResponse, RequestContext};

pub const MIME_JSON: &str = "application/json";
pub const MIME_TEXT: &str = "text/plain; charset=utf-8";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Download name used when the message carries none.
pub const DEFAULT_FILENAME: &str = "unknown";

static CONTENT_TRANSFER_ENCODING: HeaderName = HeaderName::from_static("content-transfer-encoding");

/// A rendered response body with its content type and extra headers.
#[derive(Debug, Clone)]
pub struct RenderedBody {
    pub body: Bytes,
    pub mime_type: &'static str,
    pub headers: HeaderMap,
}

/// Headers announcing a binary attachment.
pub fn file_headers(filename: &str) -> HeaderMap {
    let clean: String = filename
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && *c != '"' && *c != '\\')
        .collect();
    let clean = match clean.trim() {
        "" => DEFAULT_FILENAME,
        name => name,
    };

    let mut headers = HeaderMap::new();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{clean}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(CONTENT_DISPOSITION, disposition);
    headers.insert(CONTENT_TRANSFER_ENCODING.clone(), HeaderValue::from_static("binary"));
    headers
}

/// Remove an empty `details` array from an envelope object.
fn strip_empty_details(envelope: &mut Json) {
    if let Some(object) = envelope.as_object_mut() {
        if matches!(object.get("details"), Some(Json::Array(items)) if items.is_empty()) {
            object.remove("details");
        }
    }
}

fn envelope_json(envelope: &Message) -> Json {
    let mut json = encode_message(envelope);
    strip_empty_details(&mut json);
    json
}

/// JSON form of an output message, unwrapping single-field types.
pub fn render_json(msg: &Message) -> Json {
    let descriptor = msg.descriptor();
    if descriptor.is_envelope() {
        return envelope_json(msg);
    }

    let functional: Vec<_> = descriptor.functional_fields().collect();
    if let [only] = functional.as_slice() {
        return match msg.get(&only.name) {
            Some(value) => encode_value(only, value),
            None => default_json(only),
        };
    }

    let mut json = encode_message(msg);
    if let Some(result) = json.get_mut(ReservedField::Result.name()) {
        strip_empty_details(result);
    }
    json
}

/// Choose the body representation for a successful output message.
pub fn render_body(msg: &Message) -> RenderedBody {
    if let Some(text) = msg.get_str(ReservedField::Plaintext.name()) {
        return RenderedBody {
            body: Bytes::from(text.to_string()),
            mime_type: MIME_TEXT,
            headers: HeaderMap::new(),
        };
    }

    if let Some(data) = msg.get_bytes(ReservedField::RawFile.name()) {
        let filename = msg
            .get_str(ReservedField::Filename.name())
            .unwrap_or(DEFAULT_FILENAME);
        return RenderedBody {
            body: data.clone(),
            mime_type: MIME_OCTET,
            headers: file_headers(filename),
        };
    }

    RenderedBody {
        body: Bytes::from(render_json(msg).to_string()),
        mime_type: MIME_JSON,
        headers: HeaderMap::new(),
    }
}

/// Turn the outcome of an invocation into the HTTP response.
pub fn translate_response(ctx: RequestContext, outcome: Result<Option<Message>, RpcStatus>) -> GatewayResponse {
    let RequestContext {
        verb, binding, stream, ..
    } = ctx;

    let output = match outcome {
        Ok(output) => output,
        Err(status) => {
            tracing::warn!(
                method = %binding.method,
                code = %status.code,
                error = %status.message,
                "RPC invocation failed"
            );
            return GatewayResponse::error(&GatewayError::Internal(format!(
                "RPC {} failed: {}",
                binding.method, status.message
            )));
        }
    };

    let Some(mut msg) = output else {
        if let Some(guard) = stream {
            tracing::debug!(stream_id = guard.commit(), "Response continues on stream");
            return GatewayResponse::streaming();
        }
        return GatewayResponse::json(StatusCode::OK, &json!({}));
    };

    let raw = match extract_code(&msg) {
        Ok(raw) => raw,
        Err(problem) => {
            tracing::error!(
                method = %binding.method,
                output = msg.descriptor().full_name(),
                ?problem,
                "Response carries no readable result envelope"
            );
            return GatewayResponse::error(&GatewayError::Internal(
                "Response is missing its result envelope".to_string(),
            ));
        }
    };

    let status = http_status_for(raw);
    if status != StatusCode::OK {
        let body = envelope_of(&msg)
            .map(envelope_json)
            .unwrap_or_else(|| json!({ "code": raw }));
        return GatewayResponse::json(status, &body);
    }

    if verb == HttpVerb::Get {
        clear_envelope(&mut msg);
    }

    if let Some(guard) = stream {
        tracing::debug!(stream_id = guard.commit(), "Response continues on stream");
        return GatewayResponse::streaming();
    }

    let rendered = render_body(&msg);
    GatewayResponse {
        status,
        body: rendered.body,
        mime_type: rendered.mime_type,
        headers: rendered.headers,
        streaming: false,
    }
}
