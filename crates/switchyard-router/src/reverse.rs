//! Reverse routing: building a request path from a route and parameter values
//!
//! Placeholders are filled from the parameter map; whatever the template does not
//! consume is appended as an `application/x-www-form-urlencoded` query string with
//! keys in sorted order. When several routes share one target, the route that
//! leaves the fewest parameters over wins, and the earliest registered route wins
//! a tie.

use crate::path::normalize_path;
use crate::pattern::{Params, PathPattern, Token, WILDCARD_PARAM};
use crate::route::Route;
use std::collections::HashSet;
use tracing::trace;
use url::form_urlencoded;

/// How a caller names the route to generate a path for
#[derive(Debug, Clone, Copy)]
pub enum RouteRef<'a, T> {
    Name(&'a str),
    Target(&'a T),
}

/// A generated path with the number of parameters that ended up in the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Generated {
    pub uri: String,
    pub leftover: usize,
}

/// Value bound to a placeholder. An empty value counts as missing.
fn bound<'p>(params: &'p Params, name: &str) -> Option<&'p str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

pub(crate) fn fill(pattern: &PathPattern, params: &Params) -> Option<Generated> {
    let mut path = String::new();
    let mut consumed: HashSet<&str> = HashSet::new();

    for token in pattern.tokens() {
        path.push('/');
        match token {
            Token::Literal(text) => path.push_str(text),
            Token::Param(name) => {
                path.push_str(bound(params, name)?);
                consumed.insert(name.as_str());
            }
            Token::Wildcard => {
                path.push_str(bound(params, WILDCARD_PARAM)?);
                consumed.insert(WILDCARD_PARAM);
            }
        }
    }

    if path.is_empty() || (pattern.as_str().ends_with('/') && !path.ends_with('/')) {
        path.push('/');
    }
    let path = normalize_path(&path).ok()?;

    let mut leftover: Vec<(&String, &String)> = params
        .iter()
        .filter(|(key, _)| !consumed.contains(key.as_str()))
        .collect();
    leftover.sort();

    if leftover.is_empty() {
        return Some(Generated {
            uri: path,
            leftover: 0,
        });
    }

    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &leftover {
        query.append_pair(key, value);
    }

    Some(Generated {
        uri: format!("{}?{}", path, query.finish()),
        leftover: leftover.len(),
    })
}

/// Generate a path for one route. `None` if a placeholder has no value.
///
/// # Examples
/// ```
/// use switchyard_router::{generate_path, Params, Route};
///
/// let route = Route::new("show", "/articles/:id", ()).unwrap();
/// let mut params = Params::new();
/// params.insert("id".to_string(), "42".to_string());
/// params.insert("lang".to_string(), "en".to_string());
/// assert_eq!(generate_path(&route, &params).unwrap(), "/articles/42?lang=en");
/// ```
pub fn generate_path<T>(route: &Route<T>, params: &Params) -> Option<String> {
    fill(route.pattern(), params).map(|generated| generated.uri)
}

/// Generate a path from the best of several candidate routes, given in
/// registration order.
pub fn best_path<'a, T: 'a>(
    candidates: impl IntoIterator<Item = &'a Route<T>>,
    params: &Params,
) -> Option<String> {
    candidates
        .into_iter()
        .filter_map(|route| {
            let generated = fill(route.pattern(), params);
            if generated.is_none() {
                trace!("Route {} cannot be filled from the given params", route.name());
            }
            generated
        })
        .min_by_key(|generated| generated.leftover)
        .map(|generated| generated.uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_generate_literal_route() {
        let route = Route::new("index", "/articles", ()).unwrap();
        assert_eq!(generate_path(&route, &Params::new()).unwrap(), "/articles");
    }

    #[test]
    fn test_generate_root_route() {
        let route = Route::new("root", "/", ()).unwrap();
        assert_eq!(generate_path(&route, &Params::new()).unwrap(), "/");
        assert_eq!(
            generate_path(&route, &params(&[("q", "rust")])).unwrap(),
            "/?q=rust"
        );
    }

    #[test]
    fn test_generate_keeps_trailing_slash() {
        let route = Route::new("dir", "/files/:name/", ()).unwrap();
        assert_eq!(
            generate_path(&route, &params(&[("name", "docs")])).unwrap(),
            "/files/docs/"
        );
    }

    #[test]
    fn test_generate_missing_param() {
        let route = Route::new("show", "/articles/:id", ()).unwrap();
        assert!(generate_path(&route, &Params::new()).is_none());
    }

    #[test]
    fn test_generate_empty_param_gives_no_path() {
        let route = Route::new("show", "/articles/:id", ()).unwrap();
        assert!(generate_path(&route, &params(&[("id", "")])).is_none());

        let download = Route::new("download", "/download/:*", ()).unwrap();
        assert!(generate_path(&download, &params(&[("*", "")])).is_none());
    }

    #[test]
    fn test_generate_wildcard() {
        let route = Route::new("download", "/download/:*", ()).unwrap();
        assert_eq!(
            generate_path(&route, &params(&[("*", "foo/bar.png")])).unwrap(),
            "/download/foo/bar.png"
        );
        assert!(generate_path(&route, &Params::new()).is_none());
    }

    #[test]
    fn test_generate_query_is_sorted_and_encoded() {
        let route = Route::new("search", "/search", ()).unwrap();
        let uri = generate_path(
            &route,
            &params(&[("q", "a b&c"), ("page", "2"), ("lang", "ja")]),
        )
        .unwrap();
        assert_eq!(uri, "/search?lang=ja&page=2&q=a+b%26c");
    }

    #[test]
    fn test_best_path_prefers_fewest_leftovers() {
        let list = Route::new("list", "/articles", ()).unwrap();
        let show = Route::new("show", "/articles/:id", ()).unwrap();
        let candidates = [&list, &show];

        let uri = best_path(candidates, &params(&[("id", "7")])).unwrap();
        assert_eq!(uri, "/articles/7");

        let uri = best_path(candidates, &Params::new()).unwrap();
        assert_eq!(uri, "/articles");
    }

    #[test]
    fn test_best_path_tie_goes_to_first_registered() {
        let first = Route::new("first", "/a/:id", ()).unwrap();
        let second = Route::new("second", "/b/:id", ()).unwrap();
        let uri = best_path([&first, &second], &params(&[("id", "1")])).unwrap();
        assert_eq!(uri, "/a/1");
    }

    #[test]
    fn test_best_path_no_candidate() {
        let show = Route::new("show", "/articles/:id", ()).unwrap();
        assert!(best_path([&show], &Params::new()).is_none());
    }
}
