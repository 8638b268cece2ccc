//! Switchyard - routed HTTP/1.x server
//!
//! Glues the routing crates to the network: [`config`] turns a route file into
//! an [`HttpRouter`](switchyard_http::HttpRouter), [`codec`] frames request
//! cycles off the wire and [`server`] runs one dispatcher per connection.

pub mod codec;
pub mod config;
pub mod server;

pub use codec::HttpCodec;
pub use config::{RouteFile, DEFAULT_ROUTE_FILE};
pub use server::{HttpServer, ServerConfig, ServerError};
