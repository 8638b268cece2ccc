//! Inbound HTTP events

use crate::request::RequestHead;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_dispatch::{CycleEvent, CycleKind};
use switchyard_router::{Params, RouteMatch};
use url::form_urlencoded;

/// One piece of an inbound request
#[derive(Debug, Clone)]
pub enum HttpEvent {
    /// Request head straight from the codec
    Head(Arc<RequestHead>),
    /// Request head after routing, as seen by the selected segment
    Routed(Routed),
    /// Body chunk
    Content(Bytes),
    /// Last body chunk, possibly empty
    End(Bytes),
}

impl HttpEvent {
    pub fn head(request: RequestHead) -> Self {
        HttpEvent::Head(Arc::new(request))
    }

    /// The request this event starts, if it is a begin event
    pub fn request(&self) -> Option<&Arc<RequestHead>> {
        match self {
            HttpEvent::Head(request) => Some(request),
            HttpEvent::Routed(routed) => Some(&routed.request),
            HttpEvent::Content(_) | HttpEvent::End(_) => None,
        }
    }
}

impl CycleEvent for HttpEvent {
    fn kind(&self) -> CycleKind {
        match self {
            HttpEvent::Head(_) | HttpEvent::Routed(_) => CycleKind::Begin,
            HttpEvent::Content(_) => CycleKind::Content,
            HttpEvent::End(_) => CycleKind::End,
        }
    }
}

/// A matched request, with the route's name and the extracted parameters
#[derive(Debug, Clone)]
pub struct Routed {
    pub request: Arc<RequestHead>,
    /// Route name
    pub route: String,
    /// Segment identity, e.g. `GET:ARTICLES`
    pub identity: String,
    pub params: Params,
    pub query: HashMap<String, Vec<String>>,
}

impl Routed {
    pub(crate) fn new<T>(request: Arc<RequestHead>, found: &RouteMatch<T>, identity: String) -> Self {
        let query = request.query().map(decode_query).unwrap_or_default();
        Self {
            request,
            route: found.name().to_string(),
            identity,
            params: found.params.clone(),
            query,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Decode an `application/x-www-form-urlencoded` query, keeping repeated keys
pub fn decode_query(raw: &str) -> HashMap<String, Vec<String>> {
    let mut query: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        query
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_query() {
        let query = decode_query("q=a+b%26c&tag=x&tag=y&empty=");
        assert_eq!(query["q"], vec!["a b&c"]);
        assert_eq!(query["tag"], vec!["x", "y"]);
        assert_eq!(query["empty"], vec![""]);
    }

    #[test]
    fn test_event_kinds() {
        let head = HttpEvent::head(RequestHead::new(
            http::Method::GET,
            http::Uri::from_static("/"),
        ));
        assert_eq!(head.kind(), CycleKind::Begin);
        assert!(head.request().is_some());
        assert_eq!(HttpEvent::Content(Bytes::new()).kind(), CycleKind::Content);
        assert_eq!(HttpEvent::End(Bytes::new()).kind(), CycleKind::End);
    }
}
