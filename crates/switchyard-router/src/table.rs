//! Ordered route table for one method
//!
//! Routes are scanned in table order and the first match wins, so insertion
//! order is match priority. The table also keeps a reverse index from target to
//! route names, in registration order, for reverse routing.

use crate::path::{normalize_path, tokenize};
use crate::registry::RouteError;
use crate::reverse::{self, RouteRef};
use crate::route::{Route, RouteMatch};
use crate::Params;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{trace, warn};

/// What to do when a route is inserted under a name that is already taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Log a warning and replace the existing route
    #[default]
    Overwrite,
    /// Refuse the new route
    Reject,
}

/// Route table
pub struct RouteTable<T> {
    routes: Vec<Arc<Route<T>>>,
    by_target: HashMap<T, Vec<String>>,
    duplicates: DuplicatePolicy,
}

impl<T: Clone + Eq + Hash> RouteTable<T> {
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::default())
    }

    pub fn with_policy(duplicates: DuplicatePolicy) -> Self {
        Self {
            routes: Vec::new(),
            by_target: HashMap::new(),
            duplicates,
        }
    }

    /// Append a route with the lowest priority.
    ///
    /// Returns the route it replaced, if the name was taken.
    pub fn insert_last(
        &mut self,
        route: impl Into<Arc<Route<T>>>,
    ) -> Result<Option<Arc<Route<T>>>, RouteError> {
        let route = route.into();
        let replaced = self.take_duplicate(route.name())?;
        self.index(&route);
        self.routes.push(route);
        Ok(replaced)
    }

    /// Insert a route with the highest priority.
    ///
    /// Returns the route it replaced, if the name was taken.
    pub fn insert_first(
        &mut self,
        route: impl Into<Arc<Route<T>>>,
    ) -> Result<Option<Arc<Route<T>>>, RouteError> {
        let route = route.into();
        let replaced = self.take_duplicate(route.name())?;
        self.index(&route);
        self.routes.insert(0, route);
        Ok(replaced)
    }

    fn take_duplicate(&mut self, name: &str) -> Result<Option<Arc<Route<T>>>, RouteError> {
        if self.get(name).is_none() {
            return Ok(None);
        }

        match self.duplicates {
            DuplicatePolicy::Reject => Err(RouteError::DuplicateName(name.to_string())),
            DuplicatePolicy::Overwrite => {
                warn!("Route override for duplicate name: {}", name);
                Ok(self.remove_by_name(name))
            }
        }
    }

    fn index(&mut self, route: &Arc<Route<T>>) {
        self.by_target
            .entry(route.target().clone())
            .or_default()
            .push(route.name().to_string());
    }

    fn unindex(&mut self, route: &Route<T>) {
        if let Some(names) = self.by_target.get_mut(route.target()) {
            names.retain(|name| name != route.name());
            if names.is_empty() {
                self.by_target.remove(route.target());
            }
        }
    }

    /// Remove the route with the given name
    pub fn remove_by_name(&mut self, name: &str) -> Option<Arc<Route<T>>> {
        let position = self.routes.iter().position(|r| r.name() == name)?;
        let removed = self.routes.remove(position);
        self.unindex(&removed);
        Some(removed)
    }

    /// Remove every route whose normalized template equals the normalized `path`
    pub fn remove_by_path(&mut self, path: &str) -> Vec<Arc<Route<T>>> {
        let Ok(normalized) = normalize_path(path) else {
            return Vec::new();
        };
        self.remove_where(|route| route.pattern().as_str() == normalized)
    }

    /// Remove every route bound to `target`
    pub fn remove_by_target(&mut self, target: &T) -> Vec<Arc<Route<T>>> {
        self.remove_where(|route| route.target() == target)
    }

    fn remove_where(&mut self, predicate: impl Fn(&Route<T>) -> bool) -> Vec<Arc<Route<T>>> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.routes.drain(..).partition(|route| predicate(route));
        self.routes = kept;
        for route in &removed {
            self.unindex(route);
        }
        removed
    }

    /// First route, in table order, that matches `path`.
    ///
    /// A path that fails to normalize is simply not matched.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<T>> {
        let normalized = normalize_path(path).ok()?;
        let tokens = tokenize(&normalized);

        for route in &self.routes {
            if let Some(params) = route.pattern().match_tokens(&tokens) {
                trace!("Path {} matched route {}", path, route.name());
                return Some(RouteMatch {
                    route: Arc::clone(route),
                    params,
                });
            }
        }

        trace!("No route matched path {}", path);
        None
    }

    /// Reverse-route by name or target
    pub fn generate_path(&self, route: RouteRef<'_, T>, params: &Params) -> Option<String> {
        match route {
            RouteRef::Name(name) => reverse::generate_path(self.get(name)?, params),
            RouteRef::Target(target) => {
                let names = self.by_target.get(target)?;
                reverse::best_path(names.iter().filter_map(|n| self.get(n)), params)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Route<T>> {
        self.routes
            .iter()
            .find(|route| route.name() == name)
            .map(|route| route.as_ref())
    }

    /// Route names bound to `target`, in registration order
    pub fn names_for(&self, target: &T) -> &[String] {
        self.by_target.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Routes in priority order
    pub fn routes(&self) -> &[Arc<Route<T>>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<T: Clone + Eq + Hash> Default for RouteTable<T> {
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
    fn test_table_match_first_wins() {
        let mut table = RouteTable::new();
        table.insert_last(route("r1", "/a/:x", "first")).unwrap();
        table.insert_last(route("r2", "/a/b", "second")).unwrap();

        let matched = table.match_path("/a/b").unwrap();
        assert_eq!(matched.name(), "r1");
        assert_eq!(matched.param("x"), Some("b"));
    }

    #[test]
    fn test_table_insert_first() {
        let mut table = RouteTable::new();
        table.insert_last(route("r1", "/a/:x", "first")).unwrap();
        table.insert_first(route("r2", "/a/b", "second")).unwrap();

        assert_eq!(table.match_path("/a/b").unwrap().name(), "r2");
        assert_eq!(table.match_path("/a/c").unwrap().name(), "r1");
    }

    #[test]
    fn test_table_no_match() {
        let mut table = RouteTable::new();
        table.insert_last(route("r1", "/a", "first")).unwrap();
        assert!(table.match_path("/b").is_none());
        assert!(table.match_path("a").is_none());
        assert!(table.match_path("").is_none());
    }

    #[test]
    fn test_table_duplicate_overwrite() {
        let mut table = RouteTable::new();
        table.insert_last(route("dup", "/old", "old")).unwrap();
        let replaced = table.insert_last(route("dup", "/new", "new")).unwrap();

        assert_eq!(replaced.unwrap().pattern().as_str(), "/old");
        assert_eq!(table.len(), 1);
        assert!(table.match_path("/old").is_none());
        assert_eq!(*table.match_path("/new").unwrap().target(), "new");
        assert!(table.names_for(&"old").is_empty());
    }

    #[test]
    fn test_table_duplicate_reject() {
        let mut table = RouteTable::with_policy(DuplicatePolicy::Reject);
        table.insert_last(route("dup", "/old", "old")).unwrap();
        let err = table.insert_last(route("dup", "/new", "new")).unwrap_err();

        assert!(matches!(err, RouteError::DuplicateName(ref name) if name == "dup"));
        assert_eq!(table.len(), 1);
        assert!(table.match_path("/old").is_some());
    }

    #[test]
    fn test_table_remove_by_name() {
        let mut table = RouteTable::new();
        table.insert_last(route("a", "/a", "t")).unwrap();
        table.insert_last(route("b", "/b", "t")).unwrap();

        assert!(table.remove_by_name("a").is_some());
        assert!(table.remove_by_name("a").is_none());
        assert_eq!(table.len(), 1);
        assert_eq!(table.names_for(&"t"), &["b".to_string()]);
    }

    #[test]
    fn test_table_remove_by_path_normalizes() {
        let mut table = RouteTable::new();
        table.insert_last(route("a", "/articles", "t")).unwrap();
        table.insert_last(route("b", "/articles", "u")).unwrap();
        table.insert_last(route("c", "/other", "t")).unwrap();

        let removed = table.remove_by_path("///articles");
        assert_eq!(removed.len(), 2);
        assert_eq!(table.len(), 1);
        assert!(table.remove_by_path("not-a-path").is_empty());
    }

    #[test]
    fn test_table_remove_by_target() {
        let mut table = RouteTable::new();
        table.insert_last(route("a", "/a", "t")).unwrap();
        table.insert_last(route("b", "/b", "u")).unwrap();

        assert_eq!(table.remove_by_target(&"t").len(), 1);
        assert!(table.match_path("/a").is_none());
        assert!(table.match_path("/b").is_some());
    }

    #[test]
    fn test_table_generate_by_target() {
        let mut table = RouteTable::new();
        table.insert_last(route("list", "/articles", "articles")).unwrap();
        table.insert_last(route("show", "/articles/:id", "articles")).unwrap();

        let mut params = Params::new();
        params.insert("id".to_string(), "5".to_string());

        assert_eq!(
            table.generate_path(RouteRef::Target(&"articles"), &params),
            Some("/articles/5".to_string())
        );
        assert_eq!(
            table.generate_path(RouteRef::Name("list"), &params),
            Some("/articles?id=5".to_string())
        );
        assert_eq!(table.generate_path(RouteRef::Target(&"missing"), &params), None);
    }
}
