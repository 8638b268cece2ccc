//! Outbound responses and connection persistence

use crate::request::RequestHead;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use switchyard_dispatch::Outbox;

/// Server name shown on generated error pages
pub const SERVER_NAME: &str = "switchyard";

/// A complete response, written to the connection in one piece
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    omit_body: bool,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            omit_body: false,
        }
    }

    /// `100 Continue` for clients that sent `Expect: 100-continue`
    pub fn interim(status: StatusCode) -> Self {
        Self::new(status)
    }

    /// Set the body. An unusable content type falls back to `application/octet-stream`.
    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        self.headers.insert(CONTENT_TYPE, content_type);
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// HTML page describing an error status
    pub fn error_page(status: StatusCode) -> Self {
        let title = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        );
        let page = format!(
            "<html><head><title>{title}</title></head><body><center><h1>{title}</h1></center><hr><center>{SERVER_NAME}</center></body></html>"
        );
        Self::new(status).with_body("text/html; charset=utf-8", page)
    }

    /// Answer to a `HEAD` request: `Content-Length` still describes the body,
    /// but the body itself is not sent.
    pub fn omit_body(&mut self) {
        self.omit_body = true;
    }

    pub fn is_interim(&self) -> bool {
        self.status.is_informational()
    }

    pub fn connection(&self) -> Option<&str> {
        self.headers.get(CONNECTION).and_then(|v| v.to_str().ok())
    }

    /// Serialize status line, headers and body.
    ///
    /// Every final response carries `Content-Length`.
    pub fn encode(&self) -> Bytes {
        let version = match self.version {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };

        let mut buf = BytesMut::with_capacity(128 + self.body.len());
        buf.put_slice(
            format!(
                "{} {} {}\r\n",
                version,
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            if name == CONTENT_LENGTH {
                continue;
            }
            buf.put_slice(name.as_str().as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }

        if !self.is_interim() {
            buf.put_slice(format!("content-length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.put_slice(b"\r\n");
        if !self.omit_body {
            buf.put_slice(&self.body);
        }
        buf.freeze()
    }
}

/// Decide whether the connection survives this response.
///
/// Keep-alive marks the response `Connection: keep-alive`; otherwise it is
/// marked `Connection: close` and the outbox asks for the connection to be
/// closed once flushed. Without a request to go by, the connection closes.
/// Responses to `HEAD` requests lose their body on the wire.
pub fn apply_keep_alive(
    request: Option<&RequestHead>,
    response: &mut HttpResponse,
    outbox: &mut Outbox<HttpResponse>,
    force_close: bool,
) {
    let keep_alive = !force_close && request.map(RequestHead::is_keep_alive).unwrap_or(false);

    if let Some(request) = request {
        if request.version == Version::HTTP_10 {
            response.version = Version::HTTP_10;
        }
        if request.method == Method::HEAD {
            response.omit_body();
        }
    }

    if keep_alive {
        response
            .headers
            .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    } else {
        response
            .headers
            .insert(CONNECTION, HeaderValue::from_static("close"));
        outbox.close_after_flush();
    }
}
