//! HTTP routing on top of the dispatch engine

use crate::event::{HttpEvent, Routed};
use crate::exception::http_exception_handler;
use crate::failure::HttpFailure;
use crate::handler::HttpConfigurator;
use crate::request::RequestHead;
use crate::response::HttpResponse;
use http::{Method, StatusCode};
use std::sync::Arc;
use switchyard_dispatch::{
    Configurator, ConnectionDispatcher, ConnectionId, ConnectionTracker, DispatchEngine,
    ExceptionEnvelope, Origin, Outbox, RouteSelector, Selection,
};
use switchyard_router::{
    DuplicatePolicy, Params, Route, RouteError, RouteRef, RouteRegistry,
};
use thiserror::Error;
use tracing::{debug, trace};

pub type HttpEngine = DispatchEngine<HttpEvent, HttpResponse>;
pub type HttpDispatcher = ConnectionDispatcher<HttpEvent, HttpResponse>;

#[derive(Debug, Error)]
pub enum HttpRouterError {
    #[error("Route [{name}] could not be registered: {source}")]
    Route {
        name: String,
        #[source]
        source: RouteError,
    },
}

enum Placement {
    First,
    Last,
}

/// Builder for [`HttpRouter`].
///
/// Registration errors are held back and reported by [`build`](Self::build),
/// so routes can be chained without checking each one.
pub struct HttpRouterBuilder {
    name: String,
    registry: RouteRegistry<HttpConfigurator>,
    nested: bool,
    continue_status: Option<StatusCode>,
    exception: Option<Configurator<ExceptionEnvelope, HttpResponse>>,
    connections: Option<ConnectionTracker>,
    error: Option<HttpRouterError>,
}

impl HttpRouterBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: RouteRegistry::new(),
            nested: false,
            continue_status: Some(StatusCode::CONTINUE),
            exception: None,
            connections: None,
            error: None,
        }
    }

    /// Build a router to mount inside another router's route.
    ///
    /// A nested router routes the same request again and names its segments
    /// by route name only; failures go to the parent.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.registry = std::mem::take(&mut self.registry).with_duplicate_policy(policy);
        self
    }

    /// Interim status sent to clients expecting `100 Continue`, `None` to never send one
    pub fn continue_status(mut self, status: Option<StatusCode>) -> Self {
        self.continue_status = status;
        self
    }

    /// Accept an extension method
    pub fn method(mut self, method: Method) -> Self {
        self.registry.add_method(method);
        self
    }

    pub fn exception_handler(
        mut self,
        configurator: Configurator<ExceptionEnvelope, HttpResponse>,
    ) -> Self {
        self.exception = Some(configurator);
        self
    }

    pub fn connections(mut self, tracker: ConnectionTracker) -> Self {
        self.connections = Some(tracker);
        self
    }

    /// Register a route for `methods`; an empty list serves every method
    pub fn route(
        self,
        methods: impl IntoIterator<Item = Method>,
        name: &str,
        path: &str,
        configurator: HttpConfigurator,
    ) -> Self {
        self.add(Placement::Last, methods, name, path, configurator)
    }

    /// Register a route ahead of every route already registered
    pub fn route_first(
        self,
        methods: impl IntoIterator<Item = Method>,
        name: &str,
        path: &str,
        configurator: HttpConfigurator,
    ) -> Self {
        self.add(Placement::First, methods, name, path, configurator)
    }

    pub fn get(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::GET], name, path, configurator)
    }

    pub fn post(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::POST], name, path, configurator)
    }

    pub fn put(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::PUT], name, path, configurator)
    }

    pub fn delete(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::DELETE], name, path, configurator)
    }

    pub fn patch(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::PATCH], name, path, configurator)
    }

    pub fn head(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::HEAD], name, path, configurator)
    }

    pub fn options(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::OPTIONS], name, path, configurator)
    }

    pub fn trace(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::TRACE], name, path, configurator)
    }

    pub fn connect(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([Method::CONNECT], name, path, configurator)
    }

    /// Route serving every method, tried after the method's own routes
    pub fn any(self, name: &str, path: &str, configurator: HttpConfigurator) -> Self {
        self.route([], name, path, configurator)
    }

    fn add(
        mut self,
        placement: Placement,
        methods: impl IntoIterator<Item = Method>,
        name: &str,
        path: &str,
        configurator: HttpConfigurator,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }

        let result = Route::new(name, path, configurator)
            .map_err(RouteError::from)
            .and_then(|route| {
                let route = route.methods(methods);
                match placement {
                    Placement::First => self.registry.register_first(route),
                    Placement::Last => self.registry.register(route),
                }
            });

        if let Err(source) = result {
            self.error = Some(HttpRouterError::Route {
                name: name.to_string(),
                source,
            });
        }
        self
    }

    pub fn build(self) -> Result<HttpRouter, HttpRouterError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let registry = Arc::new(self.registry);
        let selector = HttpSelector {
            registry: Arc::clone(&registry),
            nested: self.nested,
            continue_status: self.continue_status,
        };

        let mut builder = DispatchEngine::builder(self.name, selector);
        if self.nested {
            builder = builder.nested();
        }
        match self.exception {
            Some(configurator) => builder = builder.exception_handler(configurator),
            None if !self.nested => builder = builder.exception_handler(http_exception_handler()),
            None => {}
        }
        if let Some(tracker) = self.connections {
            builder = builder.connections(tracker);
        }

        Ok(HttpRouter {
            engine: builder.build(),
            registry,
        })
    }
}

/// Routes request cycles to per-route segments
#[derive(Clone)]
pub struct HttpRouter {
    engine: Arc<HttpEngine>,
    registry: Arc<RouteRegistry<HttpConfigurator>>,
}

impl HttpRouter {
    pub fn builder(name: impl Into<String>) -> HttpRouterBuilder {
        HttpRouterBuilder::new(name)
    }

    /// Dispatcher for a new connection
    pub fn connect(&self, id: ConnectionId) -> HttpDispatcher {
        self.engine.connect(id)
    }

    /// Segment hosting this router, for mounting it under a parent route
    pub fn mount(&self) -> HttpConfigurator {
        let engine = Arc::clone(&self.engine);
        Configurator::from_fn(move |segment| {
            segment.add_last(engine.name().to_string(), engine.nested_stage())?;
            Ok(())
        })
    }

    /// Reverse-route by route name
    pub fn generate_path(&self, name: &str, params: &Params) -> Option<String> {
        self.registry.generate_path(RouteRef::Name(name), params)
    }

    /// Reverse-route by handler, picking the route that leaves the fewest params over
    pub fn generate_path_for(&self, target: &HttpConfigurator, params: &Params) -> Option<String> {
        self.registry.generate_path(RouteRef::Target(target), params)
    }

    pub fn registry(&self) -> &RouteRegistry<HttpConfigurator> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<HttpEngine> {
        &self.engine
    }

    pub fn connections(&self) -> &ConnectionTracker {
        self.engine.connections()
    }
}

struct HttpSelector {
    registry: Arc<RouteRegistry<HttpConfigurator>>,
    nested: bool,
    continue_status: Option<StatusCode>,
}

impl HttpSelector {
    fn reject(request: &Arc<RequestHead>, failure: HttpFailure) -> ExceptionEnvelope {
        let origin: Origin = Arc::clone(request) as Origin;
        ExceptionEnvelope::new(failure).with_origin(origin)
    }
}

impl RouteSelector<HttpEvent, HttpResponse> for HttpSelector {
    fn select(
        &self,
        begin: HttpEvent,
        outbox: &mut Outbox<HttpResponse>,
    ) -> Result<Selection<HttpEvent, HttpResponse>, ExceptionEnvelope> {
        let Some(request) = begin.request().cloned() else {
            return Err(ExceptionEnvelope::new(HttpFailure::Internal(
                "cycle began without a request head".to_string(),
            )));
        };

        if let Some(reason) = request.decode_error() {
            return Err(Self::reject(
                &request,
                HttpFailure::Malformed {
                    reason: reason.to_string(),
                },
            ));
        }

        if !self.nested && request.expects_continue() {
            if let Some(status) = self.continue_status {
                trace!("Sending {} to {} {}", status, request.method, request.uri);
                outbox.push(HttpResponse::interim(status));
            }
        }

        let found = self
            .registry
            .lookup(&request.method, request.path())
            .map_err(|err| Self::reject(&request, HttpFailure::from(err)))?;

        let identity = if self.nested {
            found.name().to_string()
        } else {
            found.route.identity(Some(&request.method))
        };
        debug!(
            "Routed {} {} to [{}]",
            request.method,
            request.uri,
            identity
        );

        let configurator = found.target().clone();
        let origin: Origin = Arc::clone(&request) as Origin;
        let routed = Routed::new(request, &found, identity.clone());

        Ok(Selection {
            segment: identity,
            configurator,
            event: HttpEvent::Routed(routed),
            origin: Some(origin),
        })
    }
}
