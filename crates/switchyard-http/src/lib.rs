//! HTTP binding for the switchyard router
//!
//! Requests reach a connection's dispatcher as [`HttpEvent`]s. The router
//! matches each request head against its [`RouteRegistry`], splices the
//! route's segment into the connection on first use and forwards the rest of
//! the request to it. Failures end up in the [`HttpExceptionHandler`], which
//! answers with an error page and decides whether the connection survives.
//!
//! # Examples
//! ```
//! use http::StatusCode;
//! use switchyard_http::{respond, HttpRouter};
//!
//! let router = HttpRouter::builder("ROOT")
//!     .get("index", "/articles", respond(StatusCode::OK, "text/plain", "articles"))
//!     .build()
//!     .unwrap();
//! assert_eq!(router.registry().count(), 1);
//! ```
//!
//! [`RouteRegistry`]: switchyard_router::RouteRegistry

pub mod event;
pub mod exception;
pub mod failure;
pub mod handler;
pub mod request;
pub mod response;
pub mod router;

pub use event::{decode_query, HttpEvent, Routed};
pub use exception::{http_exception_handler, HttpExceptionHandler};
pub use failure::HttpFailure;
pub use handler::{handle_with, reject, respond, HttpConfigurator, RequestHandler};
pub use request::RequestHead;
pub use response::{apply_keep_alive, HttpResponse, SERVER_NAME};
pub use router::{HttpDispatcher, HttpEngine, HttpRouter, HttpRouterBuilder, HttpRouterError};
