//! Named route bindings

use crate::pattern::{Params, PathPattern, PatternError};
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Method label used in the identity of catch-all routes
pub const ANY_METHOD: &str = "ANY";

/// A named binding from a method set and a path template to a target.
///
/// An empty method set makes the route a catch-all: it answers every method
/// once the method-specific table has no match.
#[derive(Debug, Clone)]
pub struct Route<T> {
    name: String,
    pattern: PathPattern,
    methods: Vec<Method>,
    target: T,
}

impl<T> Route<T> {
    pub fn new(name: impl Into<String>, path: &str, target: T) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.into(),
            pattern: PathPattern::parse(path)?,
            methods: Vec::new(),
            target,
        })
    }

    /// Restrict the route to one more method
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Restrict the route to the given methods
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        for method in methods {
            self = self.method(method);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn method_set(&self) -> &[Method] {
        &self.methods
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn is_catch_all(&self) -> bool {
        self.methods.is_empty()
    }

    /// Identity under which the route shows up in traces, e.g. `GET:ARTICLES`
    pub fn identity(&self, method: Option<&Method>) -> String {
        match method {
            Some(method) => format!("{}:{}", method, self.name),
            None => format!("{}:{}", ANY_METHOD, self.name),
        }
    }
}

impl<T> fmt::Display for Route<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.methods.is_empty() {
            write!(f, "{} {} -> {}", ANY_METHOD, self.pattern, self.name)
        } else {
            let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
            write!(f, "{} {} -> {}", methods.join(","), self.pattern, self.name)
        }
    }
}

/// Successful match of a request path against a route table
#[derive(Debug)]
pub struct RouteMatch<T> {
    pub route: Arc<Route<T>>,
    pub params: Params,
}

impl<T> RouteMatch<T> {
    pub fn name(&self) -> &str {
        self.route.name()
    }

    pub fn target(&self) -> &T {
        self.route.target()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl<T> Clone for RouteMatch<T> {
    fn clone(&self) -> Self {
        Self {
            route: Arc::clone(&self.route),
            params: self.params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_identity() {
        let route = Route::new("OUTER_ROUTING", "/outer", ()).unwrap();
        assert_eq!(route.identity(Some(&Method::POST)), "POST:OUTER_ROUTING");
        assert_eq!(route.identity(None), "ANY:OUTER_ROUTING");
    }

    #[test]
    fn test_route_methods_deduplicate() {
        let route = Route::new("a", "/a", ())
            .unwrap()
            .methods([Method::GET, Method::POST, Method::GET]);
        assert_eq!(route.method_set(), &[Method::GET, Method::POST]);
        assert!(!route.is_catch_all());
        assert_eq!(route.to_string(), "GET,POST /a -> a");
    }

    #[test]
    fn test_route_invalid_template() {
        assert!(Route::new("bad", "no-slash", ()).is_err());
    }
}
