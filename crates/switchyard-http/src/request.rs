//! Decoded request heads

use http::header::{CONNECTION, EXPECT};
use http::{HeaderMap, HeaderValue, Method, Uri, Version};

/// Request line and headers of one request, as handed over by the codec.
///
/// A head the codec could not decode still comes through, with the reason
/// recorded, so that routing can answer it with a 400.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    decode_error: Option<String>,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            decode_error: None,
        }
    }

    /// Head standing in for a request the codec failed to decode
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            decode_error: Some(reason.into()),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn decode_ok(&self) -> bool {
        self.decode_error.is_none()
    }

    pub fn decode_error(&self) -> Option<&str> {
        self.decode_error.as_deref()
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, without the `?`
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Whether the connection may stay open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is sent;
    /// HTTP/1.0 needs an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.headers.get_all(CONNECTION).iter().any(|value| {
                value
                    .to_str()
                    .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
                    .unwrap_or(false)
            })
        };

        match self.version {
            Version::HTTP_09 | Version::HTTP_10 => has_token("keep-alive"),
            _ => !has_token("close"),
        }
    }

    /// Whether the client waits for `100 Continue` before sending the body
    pub fn expects_continue(&self) -> bool {
        self.version != Version::HTTP_10
            && self
                .headers
                .get(EXPECT)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.eq_ignore_ascii_case("100-continue"))
                .unwrap_or(false)
    }
}
