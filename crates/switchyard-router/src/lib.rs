//! Path routing for the switchyard dispatcher
//!
//! Matches request paths against `/literal/:param/:*` templates, keeps routes in
//! per-method tables with first-match-wins ordering, and generates request paths
//! back from route names or targets.

pub mod path;
pub mod pattern;
pub mod registry;
pub mod reverse;
pub mod route;
pub mod table;

pub use path::{normalize_path, PathError};
pub use pattern::{Params, PathPattern, PatternError, Token, WILDCARD_PARAM};
pub use registry::{RouteError, RouteRegistry, STANDARD_METHODS};
pub use reverse::{best_path, generate_path, RouteRef};
pub use route::{Route, RouteMatch, ANY_METHOD};
pub use table::{DuplicatePolicy, RouteTable};
