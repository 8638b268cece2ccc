//! Failure envelope carried to exception segments
//!
//! Every failure that crosses a dispatcher boundary is wrapped exactly once.
//! Each boundary it passes on the way out prepends the identity of the segment
//! that was active there, so the trace reads outer to inner:
//! `POST:OUTER -> MIDDLE -> INNER`.

use crate::stage::BoxError;
use std::any::Any;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Separator between route identities in a rendered trace
pub const TRACE_SEPARATOR: &str = " -> ";

/// Opaque handle on the request that started the failing cycle
pub type Origin = Arc<dyn Any + Send + Sync>;

/// A failure together with where it happened
pub struct ExceptionEnvelope {
    cause: BoxError,
    origin: Option<Origin>,
    route: Option<String>,
    trace: VecDeque<String>,
}

impl ExceptionEnvelope {
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self {
            cause: cause.into(),
            origin: None,
            route: None,
            trace: VecDeque::new(),
        }
    }

    /// Wrap an error unless it already is an envelope
    pub fn wrap(err: BoxError) -> Self {
        match err.downcast::<ExceptionEnvelope>() {
            Ok(envelope) => *envelope,
            Err(cause) => Self::new(cause),
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Fill in request and route context that is still missing.
    ///
    /// Context bound closer to the failure is kept.
    pub fn bind(&mut self, origin: Option<&Origin>, route: Option<&str>) {
        if self.origin.is_none() {
            self.origin = origin.cloned();
        }
        if self.route.is_none() {
            self.route = route.map(str::to_string);
        }
    }

    pub fn prepend_trace(&mut self, identity: impl Into<String>) {
        self.trace.push_front(identity.into());
    }

    /// The trace rendered outer to inner, e.g. `POST:OUTER -> INNER`
    pub fn routing_trace(&self) -> String {
        let parts: Vec<&str> = self.trace.iter().map(String::as_str).collect();
        parts.join(TRACE_SEPARATOR)
    }

    pub fn trace(&self) -> impl Iterator<Item = &str> {
        self.trace.iter().map(String::as_str)
    }

    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    pub fn downcast_cause<E: Error + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }

    pub fn into_cause(self) -> BoxError {
        self.cause
    }

    /// The originating request, if it is of type `R`
    pub fn origin<R: Any + Send + Sync>(&self) -> Option<&R> {
        self.origin.as_ref()?.downcast_ref::<R>()
    }

    pub fn origin_handle(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Identity of the innermost route bound to the failure
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }
}

impl fmt::Debug for ExceptionEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionEnvelope")
            .field("cause", &self.cause)
            .field("has_origin", &self.origin.is_some())
            .field("route", &self.route)
            .field("trace", &self.trace)
            .finish()
    }
}

impl fmt::Display for ExceptionEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trace.is_empty() {
            write!(f, "{}", self.cause)
        } else {
            write!(f, "{} (route trace: {})", self.cause, self.routing_trace())
        }
    }
}

impl Error for ExceptionEnvelope {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause.as_ref())
    }
}
