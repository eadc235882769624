//! The HTTP-side callbacks a stream writes through.

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;

use crate::net::ConnectionHandle;
use crate::translate::response::{file_headers, MIME_JSON, MIME_OCTET, MIME_TEXT};

/// Delivers stream output to an HTTP connection.
///
/// Called from the stream control thread; implementations must not block
/// for long.
pub trait StreamSink: Send + Sync {
    fn send(&self, connection: ConnectionHandle, data: Bytes);

    fn send_file(&self, connection: ConnectionHandle, data: Bytes) {
        self.send(connection, data);
    }

    fn set_headers(&self, connection: ConnectionHandle, headers: HeaderMap);

    fn close(&self, connection: ConnectionHandle);
}

/// Kind of content a stream is about to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamContent {
    Json,
    Plaintext,
    File { filename: String, size: Option<u64> },
}

impl StreamContent {
    pub fn headers(&self) -> HeaderMap {
        match self {
            StreamContent::Json => content_type(MIME_JSON),
            StreamContent::Plaintext => content_type(MIME_TEXT),
            StreamContent::File { filename, size } => {
                let mut headers = file_headers(filename);
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(MIME_OCTET));
                if let Some(size) = size {
                    headers.insert(CONTENT_LENGTH, HeaderValue::from(*size));
                }
                headers
            }
        }
    }
}

fn content_type(mime: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime));
    headers
}

/// Drops everything. Used when no HTTP server is attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn send(&self, connection: ConnectionHandle, data: Bytes) {
        tracing::trace!(%connection, len = data.len(), "Discarding stream data");
    }

    fn set_headers(&self, _connection: ConnectionHandle, _headers: HeaderMap) {}

    fn close(&self, connection: ConnectionHandle) {
        tracing::trace!(%connection, "Discarding stream close");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_DISPOSITION;

    #[test]
    fn file_content_headers() {
        let headers = StreamContent::File {
            filename: "a.csv".into(),
            size: Some(12),
        }
        .headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), MIME_OCTET);
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "12");
        assert_eq!(headers.get(CONTENT_DISPOSITION).unwrap(), "attachment; filename=\"a.csv\"");
    }

    #[test]
    fn text_content_headers() {
        assert_eq!(StreamContent::Plaintext.headers().get(CONTENT_TYPE).unwrap(), MIME_TEXT);
        assert_eq!(StreamContent::Json.headers().len(), 1);
    }
}
