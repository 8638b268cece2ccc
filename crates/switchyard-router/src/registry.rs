//! Route registry: one route table per method plus a catch-all table
//!
//! Lookup tries the table for the request method first and falls back to the
//! catch-all table on a miss. A method without a table is rejected, both at
//! registration time and at lookup time.

use crate::pattern::{Params, PatternError};
use crate::reverse::{self, RouteRef};
use crate::route::{Route, RouteMatch};
use crate::table::{DuplicatePolicy, RouteTable};
use http::Method;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Route registry errors
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("Route already exists: {0}")]
    DuplicateName(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(Method),

    #[error("The resource not found: {path}")]
    NotFound { path: String },
}

/// The methods every registry starts with
pub const STANDARD_METHODS: [Method; 9] = [
    Method::CONNECT,
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PATCH,
    Method::POST,
    Method::PUT,
    Method::TRACE,
];

struct Registered<T> {
    seq: u64,
    route: Arc<Route<T>>,
}

/// Route registry
///
/// Built during configuration and read-only while serving, so registration
/// takes `&mut self`.
pub struct RouteRegistry<T> {
    tables: HashMap<Method, RouteTable<T>>,
    catch_all: RouteTable<T>,
    names: HashMap<String, Registered<T>>,
    next_seq: u64,
    duplicates: DuplicatePolicy,
}

impl<T: Clone + Eq + Hash> RouteRegistry<T> {
    /// Registry with a table for each standard method
    pub fn new() -> Self {
        Self::with_methods(STANDARD_METHODS)
    }

    /// Registry with a table for each of the given methods only
    pub fn with_methods(methods: impl IntoIterator<Item = Method>) -> Self {
        let mut registry = Self {
            tables: HashMap::new(),
            catch_all: RouteTable::new(),
            names: HashMap::new(),
            next_seq: 0,
            duplicates: DuplicatePolicy::default(),
        };
        for method in methods {
            registry.add_method(method);
        }
        registry
    }

    pub fn with_duplicate_policy(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// Add a table for an extension method. No-op if it already exists.
    pub fn add_method(&mut self, method: Method) {
        self.tables.entry(method).or_default();
    }

    /// Register a route with the lowest priority in each of its tables
    pub fn register(&mut self, route: Route<T>) -> Result<Arc<Route<T>>, RouteError> {
        self.insert(route, false)
    }

    /// Register a route with the highest priority in each of its tables
    pub fn register_first(&mut self, route: Route<T>) -> Result<Arc<Route<T>>, RouteError> {
        self.insert(route, true)
    }

    fn insert(&mut self, route: Route<T>, first: bool) -> Result<Arc<Route<T>>, RouteError> {
        if let Some(method) = route
            .method_set()
            .iter()
            .find(|method| !self.tables.contains_key(*method))
        {
            return Err(RouteError::UnsupportedMethod(method.clone()));
        }

        if self.names.contains_key(route.name()) {
            match self.duplicates {
                DuplicatePolicy::Reject => {
                    return Err(RouteError::DuplicateName(route.name().to_string()));
                }
                DuplicatePolicy::Overwrite => {
                    warn!("Route override for duplicate name: {}", route.name());
                    self.remove_by_name(route.name());
                }
            }
        }

        debug!("Registering route: {}", route);
        let route = Arc::new(route);

        let mut tables: Vec<&mut RouteTable<T>> = Vec::new();
        if route.is_catch_all() {
            tables.push(&mut self.catch_all);
        } else {
            for (method, table) in self.tables.iter_mut() {
                if route.method_set().contains(method) {
                    tables.push(table);
                }
            }
        }

        for table in tables {
            if first {
                table.insert_first(Arc::clone(&route))?;
            } else {
                table.insert_last(Arc::clone(&route))?;
            }
        }

        self.names.insert(
            route.name().to_string(),
            Registered {
                seq: self.next_seq,
                route: Arc::clone(&route),
            },
        );
        self.next_seq += 1;

        Ok(route)
    }

    /// Match a request against the method's table, then the catch-all table
    pub fn lookup(&self, method: &Method, path: &str) -> Result<RouteMatch<T>, RouteError> {
        let table = self
            .tables
            .get(method)
            .ok_or_else(|| RouteError::UnsupportedMethod(method.clone()))?;

        if let Some(found) = table.match_path(path) {
            return Ok(found);
        }

        if let Some(found) = self.catch_all.match_path(path) {
            trace!("Catch-all route {} answered {} {}", found.name(), method, path);
            return Ok(found);
        }

        Err(RouteError::NotFound {
            path: path.to_string(),
        })
    }

    /// Remove a route from every table it was registered in
    pub fn remove_by_name(&mut self, name: &str) -> Option<Arc<Route<T>>> {
        let registered = self.names.remove(name)?;
        for table in self.tables.values_mut() {
            table.remove_by_name(name);
        }
        self.catch_all.remove_by_name(name);
        debug!("Removed route: {}", registered.route);
        Some(registered.route)
    }

    /// Remove every route with the given template from every method table and
    /// the catch-all table
    pub fn remove_by_path(&mut self, path: &str) -> Vec<Arc<Route<T>>> {
        let mut removed = Vec::new();
        for table in self.tables.values_mut() {
            removed.extend(table.remove_by_path(path));
        }
        removed.extend(self.catch_all.remove_by_path(path));
        self.forget(removed)
    }

    /// Remove every route bound to `target`
    pub fn remove_by_target(&mut self, target: &T) -> Vec<Arc<Route<T>>> {
        let mut removed = Vec::new();
        for table in self.tables.values_mut() {
            removed.extend(table.remove_by_target(target));
        }
        removed.extend(self.catch_all.remove_by_target(target));
        self.forget(removed)
    }

    fn forget(&mut self, removed: Vec<Arc<Route<T>>>) -> Vec<Arc<Route<T>>> {
        let mut unique = Vec::new();
        for route in removed {
            if let Some(registered) = self.names.remove(route.name()) {
                debug!("Removed route: {}", registered.route);
                unique.push(registered.route);
            }
        }
        unique
    }

    /// Build a request path for a route, by name or by target
    pub fn generate_path(&self, route: RouteRef<'_, T>, params: &Params) -> Option<String> {
        match route {
            RouteRef::Name(name) => {
                reverse::generate_path(&self.names.get(name)?.route, params)
            }
            RouteRef::Target(target) => {
                let mut candidates: Vec<&Registered<T>> = self
                    .names
                    .values()
                    .filter(|registered| registered.route.target() == target)
                    .collect();
                candidates.sort_by_key(|registered| registered.seq);
                reverse::best_path(
                    candidates.into_iter().map(|registered| registered.route.as_ref()),
                    params,
                )
            }
        }
    }

    pub fn route(&self, name: &str) -> Option<Arc<Route<T>>> {
        self.names.get(name).map(|registered| Arc::clone(&registered.route))
    }

    /// All routes, in registration order
    pub fn routes(&self) -> Vec<Arc<Route<T>>> {
        let mut registered: Vec<&Registered<T>> = self.names.values().collect();
        registered.sort_by_key(|registered| registered.seq);
        registered
            .into_iter()
            .map(|registered| Arc::clone(&registered.route))
            .collect()
    }

    pub fn table(&self, method: &Method) -> Option<&RouteTable<T>> {
        self.tables.get(method)
    }

    pub fn catch_all(&self) -> &RouteTable<T> {
        &self.catch_all
    }

    /// Methods with a table
    pub fn methods(&self) -> Vec<&Method> {
        let mut methods: Vec<&Method> = self.tables.keys().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Number of distinct route names
    pub fn count(&self) -> usize {
        self.names.len()
    }
}

impl<T: Clone + Eq + Hash> Default for RouteRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, path: &str, target: &'static str) -> Route<&'static str> {
        Route::new(name, path, target).unwrap()
    }

    #[test]
    fn test_registry_register_lookup() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("index", "/articles", "index").method(Method::GET))
            .unwrap();

        let found = registry.lookup(&Method::GET, "/articles").unwrap();
        assert_eq!(*found.target(), "index");

        let found = registry.lookup(&Method::GET, "//articles//").unwrap();
        assert_eq!(*found.target(), "index");
    }

    #[test]
    fn test_registry_method_fan_out_shares_route() {
        let mut registry = RouteRegistry::new();
        let registered = registry
            .register(route("both", "/both", "t").methods([Method::GET, Method::POST]))
            .unwrap();

        let get = registry.lookup(&Method::GET, "/both").unwrap();
        let post = registry.lookup(&Method::POST, "/both").unwrap();
        assert!(Arc::ptr_eq(&get.route, &registered));
        assert!(Arc::ptr_eq(&post.route, &registered));
        assert!(registry.lookup(&Method::PUT, "/both").is_err());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_registry_not_found() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("index", "/articles", "index").method(Method::GET))
            .unwrap();

        let err = registry.lookup(&Method::GET, "/missing").unwrap_err();
        assert!(matches!(err, RouteError::NotFound { ref path } if path == "/missing"));
        assert_eq!(err.to_string(), "The resource not found: /missing");
    }

    #[test]
    fn test_registry_unsupported_method_at_lookup() {
        let registry: RouteRegistry<&str> = RouteRegistry::with_methods([Method::GET]);
        let err = registry.lookup(&Method::POST, "/").unwrap_err();
        assert!(matches!(err, RouteError::UnsupportedMethod(ref m) if *m == Method::POST));
    }

    #[test]
    fn test_registry_unsupported_method_at_registration() {
        let mut registry = RouteRegistry::new();
        let purge = Method::from_bytes(b"PURGE").unwrap();
        let err = registry
            .register(route("purge", "/cache", "t").method(purge.clone()))
            .unwrap_err();
        assert!(matches!(err, RouteError::UnsupportedMethod(_)));
        assert_eq!(registry.count(), 0);

        registry.add_method(purge.clone());
        registry
            .register(route("purge", "/cache", "t").method(purge.clone()))
            .unwrap();
        assert!(registry.lookup(&purge, "/cache").is_ok());
    }

    #[test]
    fn test_registry_catch_all_fallback() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("specific", "/a", "specific").method(Method::GET))
            .unwrap();
        registry.register(route("fallback", "/:*", "fallback")).unwrap();

        assert_eq!(*registry.lookup(&Method::GET, "/a").unwrap().target(), "specific");
        assert_eq!(*registry.lookup(&Method::GET, "/b").unwrap().target(), "fallback");
        assert_eq!(*registry.lookup(&Method::DELETE, "/a").unwrap().target(), "fallback");
    }

    #[test]
    fn test_registry_duplicate_overwrites_across_methods() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("dup", "/old", "old").method(Method::GET))
            .unwrap();
        registry
            .register(route("dup", "/new", "new").method(Method::POST))
            .unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.lookup(&Method::GET, "/old").is_err());
        assert_eq!(*registry.lookup(&Method::POST, "/new").unwrap().target(), "new");
    }

    #[test]
    fn test_registry_duplicate_reject() {
        let mut registry = RouteRegistry::new().with_duplicate_policy(DuplicatePolicy::Reject);
        registry
            .register(route("dup", "/old", "old").method(Method::GET))
            .unwrap();
        let err = registry
            .register(route("dup", "/new", "new").method(Method::GET))
            .unwrap_err();
        assert!(matches!(err, RouteError::DuplicateName(_)));
        assert!(registry.lookup(&Method::GET, "/old").is_ok());
    }

    #[test]
    fn test_registry_register_first() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("generic", "/a/:x", "generic").method(Method::GET))
            .unwrap();
        registry
            .register_first(route("specific", "/a/b", "specific").method(Method::GET))
            .unwrap();

        assert_eq!(registry.lookup(&Method::GET, "/a/b").unwrap().name(), "specific");
    }

    #[test]
    fn test_registry_remove_by_path_sweeps_all_tables() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("get", "/shared", "a").method(Method::GET))
            .unwrap();
        registry
            .register(route("post", "/shared", "b").method(Method::POST))
            .unwrap();
        registry.register(route("any", "//shared", "c")).unwrap();
        registry
            .register(route("other", "/other", "d").method(Method::GET))
            .unwrap();

        let removed = registry.remove_by_path("/shared");
        assert_eq!(removed.len(), 3);
        assert_eq!(registry.count(), 1);
        assert!(registry.lookup(&Method::GET, "/shared").is_err());
        assert!(registry.lookup(&Method::PUT, "/shared").is_err());
    }

    #[test]
    fn test_registry_remove_by_name() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("both", "/both", "t").methods([Method::GET, Method::POST]))
            .unwrap();

        assert!(registry.remove_by_name("both").is_some());
        assert!(registry.remove_by_name("both").is_none());
        assert!(registry.lookup(&Method::GET, "/both").is_err());
        assert!(registry.lookup(&Method::POST, "/both").is_err());
    }

    #[test]
    fn test_registry_remove_by_target() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("a", "/a", "t").method(Method::GET))
            .unwrap();
        registry.register(route("b", "/b", "t")).unwrap();
        registry
            .register(route("c", "/c", "u").method(Method::GET))
            .unwrap();

        assert_eq!(registry.remove_by_target(&"t").len(), 2);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_registry_generate_path() {
        let mut registry = RouteRegistry::new();
        registry
            .register(route("list", "/articles", "articles").method(Method::GET))
            .unwrap();
        registry
            .register(route("show", "/articles/:id", "articles").method(Method::GET))
            .unwrap();

        let mut params = Params::new();
        params.insert("id".to_string(), "9".to_string());

        assert_eq!(
            registry.generate_path(RouteRef::Target(&"articles"), &params),
            Some("/articles/9".to_string())
        );
        assert_eq!(
            registry.generate_path(RouteRef::Name("list"), &params),
            Some("/articles?id=9".to_string())
        );
        assert_eq!(registry.generate_path(RouteRef::Name("missing"), &params), None);
    }

    #[test]
    fn test_registry_routes_in_registration_order() {
        let mut registry = RouteRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register(route(name, &format!("/{}", name), "t").method(Method::GET))
                .unwrap();
        }
        let names: Vec<String> = registry
            .routes()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(registry.methods().len(), 9);
    }
}
