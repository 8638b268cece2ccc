//! Request path normalization and tokenization
//!
//! Every path goes through [`normalize_path`] before it is compared against a
//! pattern, both when a template is registered and when a request is matched:
//! - leading slash runs collapse to exactly one `/`
//! - trailing slash runs collapse to one `/` if the source had any, else none
//! - interior slash runs are kept, so `/a//b` has an empty segment between `a` and `b`

use thiserror::Error;

/// Errors raised while normalizing a path
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid Path: empty path")]
    Empty,

    #[error("Invalid Path: [{path}], The Path must be beginning with a slash.")]
    NotBeginningWithSlash { path: String },
}

/// Normalize a request path or path template.
///
/// # Examples
/// ```
/// use switchyard_router::path::normalize_path;
///
/// assert_eq!(normalize_path("//articles//").unwrap(), "/articles/");
/// assert_eq!(normalize_path("/articles").unwrap(), "/articles");
/// assert_eq!(normalize_path("///").unwrap(), "/");
/// assert!(normalize_path("articles").is_err());
/// ```
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    if !path.starts_with('/') {
        return Err(PathError::NotBeginningWithSlash {
            path: path.to_string(),
        });
    }

    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }

    let mut normalized = String::with_capacity(trimmed.len() + 2);
    normalized.push('/');
    normalized.push_str(trimmed);
    if path.ends_with('/') {
        normalized.push('/');
    }

    Ok(normalized)
}

/// Split a normalized path into its segments.
///
/// The empty piece before the leading slash is skipped and trailing empty
/// pieces are dropped, so `/a` and `/a/` yield the same tokens and `/` yields
/// none. Empty pieces in the middle are kept.
pub fn tokenize(normalized: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = normalized.split('/').skip(1).collect();
    while tokens.last().is_some_and(|t| t.is_empty()) {
        tokens.pop();
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain_path() {
        assert_eq!(normalize_path("/bankai").unwrap(), "/bankai");
        assert_eq!(normalize_path("/bankai/").unwrap(), "/bankai/");
    }

    #[test]
    fn test_normalize_collapses_leading_and_trailing_runs() {
        assert_eq!(normalize_path("///bankai").unwrap(), "/bankai");
        assert_eq!(normalize_path("/bankai///").unwrap(), "/bankai/");
        assert_eq!(normalize_path("//articles//").unwrap(), "/articles/");
    }

    #[test]
    fn test_normalize_only_slashes() {
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("////").unwrap(), "/");
    }

    #[test]
    fn test_normalize_keeps_interior_runs() {
        assert_eq!(normalize_path("/a//b").unwrap(), "/a//b");
        assert_eq!(normalize_path("//a//b//").unwrap(), "/a//b/");
    }

    #[test]
    fn test_normalize_rejects_relative_path() {
        let err = normalize_path("bankai/").unwrap_err();
        assert_eq!(
            err,
            PathError::NotBeginningWithSlash {
                path: "bankai/".to_string()
            }
        );
        assert!(err.to_string().contains("[bankai/]"));
        assert_eq!(normalize_path(""), Err(PathError::Empty));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for path in ["/", "//x", "/x/", "/a//b///", "/:id/:*"] {
            let once = normalize_path(path).unwrap();
            assert_eq!(normalize_path(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_tokenize() {
        assert!(tokenize("/").is_empty());
        assert_eq!(tokenize("/a"), vec!["a"]);
        assert_eq!(tokenize("/a/"), vec!["a"]);
        assert_eq!(tokenize("/a//b"), vec!["a", "", "b"]);
        assert_eq!(tokenize("/a/:id/:*"), vec!["a", ":id", ":*"]);
    }
}
