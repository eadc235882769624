//! Request identification and caller metadata extraction.
//!
//! # Responsibilities
//! - Stamp every request with an `x-request-id` (UUID v4) unless the client sent one
//! - Derive caller identity and upload metadata from request headers

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::translate::{CallerIdentity, UploadMeta};

/// Header carrying the request id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Header set by an authenticating front end with the caller's user name.
pub const X_REMOTE_USER: HeaderName = HeaderName::from_static("x-remote-user");

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// The request id assigned to this request, if any.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(&X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

pub fn caller_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> CallerIdentity {
    CallerIdentity {
        ip: peer.map(|addr| addr.ip()),
        username: headers
            .get(&X_REMOTE_USER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
    }
}

/// Upload metadata from `Content-Disposition: ...; filename="..."`.
pub fn upload_meta(headers: &HeaderMap) -> Option<UploadMeta> {
    let disposition = headers.get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
    let filename = disposition.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("filename") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })?;
    if filename.is_empty() {
        return None;
    }

    Some(UploadMeta {
        filename,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_uuids() {
        let req = Request::new(());
        let id = MakeRequestUuidV4.make_request_id(&req).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(text).is_ok());
    }

    #[test]
    fn caller_from_peer_and_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REMOTE_USER, HeaderValue::from_static("alice"));
        let peer: SocketAddr = "10.0.0.7:5000".parse().unwrap();

        let caller = caller_identity(&headers, Some(peer));
        assert_eq!(caller.ip, Some(peer.ip()));
        assert_eq!(caller.username.as_deref(), Some("alice"));

        let anonymous = caller_identity(&HeaderMap::new(), None);
        assert_eq!(anonymous, CallerIdentity::default());
    }

    #[test]
    fn upload_filename_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"report.csv\""),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));

        let meta = upload_meta(&headers).unwrap();
        assert_eq!(meta.filename, "report.csv");
        assert_eq!(meta.content_type.as_deref(), Some("text/csv"));

        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
        assert!(upload_meta(&headers).is_none());
    }
}
