//! HTTP/1.x request framing using httparse.
//!
//! Splits the inbound byte stream into request cycles: one `Head`, any number
//! of `Content` chunks and one `End`. Bodies are delimited by
//! `Content-Length`; a head that can't be decoded is still surfaced, marked
//! malformed, and everything after it on the connection is discarded.

use bytes::{Buf, BytesMut};
use http::header::{HeaderName, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderValue, Method, Uri, Version};
use std::io;
use switchyard_http::{HttpEvent, HttpResponse, RequestHead};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Maximum number of headers to parse
const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for a request head
    Head,
    /// Body bytes still expected for the current request
    Body { remaining: usize },
    /// Head of a bodiless request went out, its end is next
    End,
    /// A malformed head went out, its end is next
    FailedEnd,
    /// Stream unusable, input is discarded
    Failed,
}

/// Request decoder and response encoder for one connection
#[derive(Debug)]
pub struct HttpCodec {
    state: DecodeState,
    max_head_bytes: usize,
}

impl HttpCodec {
    pub fn new(max_head_bytes: usize) -> Self {
        Self {
            state: DecodeState::Head,
            max_head_bytes,
        }
    }

    fn fail(&mut self, src: &mut BytesMut, reason: String) -> HttpEvent {
        debug!("Request head rejected: {}", reason);
        src.clear();
        self.state = DecodeState::FailedEnd;
        HttpEvent::head(RequestHead::malformed(reason))
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Option<HttpEvent> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(src) {
            Ok(httparse::Status::Complete(head_len)) => head_len,
            Ok(httparse::Status::Partial) => {
                if src.len() > self.max_head_bytes {
                    let reason = format!("request head exceeds {} bytes", self.max_head_bytes);
                    return Some(self.fail(src, reason));
                }
                return None;
            }
            Err(e) => return Some(self.fail(src, format!("invalid request head: {}", e))),
        };

        if head_len > self.max_head_bytes {
            let reason = format!("request head exceeds {} bytes", self.max_head_bytes);
            return Some(self.fail(src, reason));
        }

        let request = match build_head(&req) {
            Ok(request) => request,
            Err(reason) => return Some(self.fail(src, reason)),
        };

        let content_length = match body_length(&request) {
            Ok(length) => length,
            Err(reason) => return Some(self.fail(src, reason)),
        };

        trace!(
            "Decoded request head: {} {} (content_length={})",
            request.method,
            request.uri,
            content_length
        );

        src.advance(head_len);
        self.state = if content_length == 0 {
            DecodeState::End
        } else {
            DecodeState::Body {
                remaining: content_length,
            }
        };
        Some(HttpEvent::head(request))
    }
}

fn build_head(req: &httparse::Request<'_, '_>) -> Result<RequestHead, String> {
    let method = req.method.unwrap_or("");
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| format!("invalid method: {}", method))?;

    let path = req.path.unwrap_or("");
    let uri: Uri = path
        .parse()
        .map_err(|e| format!("invalid request target {}: {}", path, e))?;

    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut request = RequestHead::new(method, uri).with_version(version);
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| format!("invalid header name: {}", header.name))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| format!("invalid value for header {}", header.name))?;
        request = request.with_header(name, value);
    }

    Ok(request)
}

fn body_length(request: &RequestHead) -> Result<usize, String> {
    if request.headers.contains_key(TRANSFER_ENCODING) {
        return Err("transfer-encoding is not supported".to_string());
    }

    let mut lengths = request.headers.get_all(CONTENT_LENGTH).iter();
    let Some(value) = lengths.next() else {
        return Ok(0);
    };
    if lengths.next().is_some() {
        return Err("multiple content-length headers".to_string());
    }

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| "invalid content-length".to_string())
}

impl Decoder for HttpCodec {
    type Item = HttpEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HttpEvent>, io::Error> {
        match self.state {
            DecodeState::Head => {
                if src.is_empty() {
                    return Ok(None);
                }
                Ok(self.decode_head(src))
            }
            DecodeState::Body { remaining } => {
                if src.is_empty() {
                    return Ok(None);
                }
                let take = remaining.min(src.len());
                let chunk = src.split_to(take).freeze();
                if take == remaining {
                    self.state = DecodeState::Head;
                    Ok(Some(HttpEvent::End(chunk)))
                } else {
                    self.state = DecodeState::Body {
                        remaining: remaining - take,
                    };
                    Ok(Some(HttpEvent::Content(chunk)))
                }
            }
            DecodeState::End => {
                self.state = DecodeState::Head;
                Ok(Some(HttpEvent::End(bytes::Bytes::new())))
            }
            DecodeState::FailedEnd => {
                self.state = DecodeState::Failed;
                Ok(Some(HttpEvent::End(bytes::Bytes::new())))
            }
            DecodeState::Failed => {
                src.clear();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<HttpEvent>, io::Error> {
        match self.decode(src)? {
            Some(event) => Ok(Some(event)),
            None => {
                let truncated = match self.state {
                    DecodeState::Body { remaining } => {
                        Some(format!("{} body bytes outstanding", remaining))
                    }
                    DecodeState::Head if !src.is_empty() => {
                        Some(format!("{} bytes of an incomplete request head", src.len()))
                    }
                    _ => None,
                };
                src.clear();
                match truncated {
                    Some(reason) => Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("connection closed mid-request: {}", reason),
                    )),
                    None => Ok(None),
                }
            }
        }
    }
}

impl Encoder<HttpResponse> for HttpCodec {
    type Error = io::Error;

    fn encode(&mut self, response: HttpResponse, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(&response.encode());
        Ok(())
    }
}
