//! Path templates
//!
//! A template is a normalized path whose segments are either literal text,
//! a named placeholder (`:id`) or the wildcard placeholder (`:*`).
//!
//! # Supported templates
//! - `/articles` - literal only
//! - `/articles/:id` - binds `id` to one segment
//! - `/download/:*` - binds `*` to every remaining segment, rejoined with `/`
//!
//! # Rejected templates
//! - `articles/:id` - no leading slash
//! - `/:*/tail` - wildcard not in last position
//! - `/articles/:` - placeholder without a name

use crate::path::{normalize_path, tokenize, PathError};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Name under which the wildcard remainder is bound
pub const WILDCARD_PARAM: &str = "*";

const WILDCARD_TOKEN: &str = ":*";

/// Extracted parameters, keyed by placeholder name
pub type Params = HashMap<String, String>;

/// Errors raised while building a [`PathPattern`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("Invalid Path: [{path}], the wildcard token must be the last segment")]
    WildcardNotLast { path: String },

    #[error("Invalid Path: [{path}], placeholder at segment {index} has no name")]
    EmptyParamName { path: String, index: usize },
}

/// One segment of a template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Literal(String),
    Param(String),
    Wildcard,
}

impl Token {
    fn parse(raw: &str) -> Option<Self> {
        if raw == WILDCARD_TOKEN {
            Some(Token::Wildcard)
        } else if let Some(name) = raw.strip_prefix(':') {
            if name.is_empty() {
                None
            } else {
                Some(Token::Param(name.to_string()))
            }
        } else {
            Some(Token::Literal(raw.to_string()))
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => write!(f, "{}", text),
            Token::Param(name) => write!(f, ":{}", name),
            Token::Wildcard => write!(f, "{}", WILDCARD_TOKEN),
        }
    }
}

/// A validated, immutable path template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    /// Normalized template text
    path: String,
    tokens: Vec<Token>,
}

impl PathPattern {
    /// Parse and validate a template
    ///
    /// # Examples
    /// ```
    /// use switchyard_router::pattern::PathPattern;
    ///
    /// let pattern = PathPattern::parse("/a/:b/:*").unwrap();
    /// let params = pattern.matches("/a/x/c/d/e").unwrap();
    /// assert_eq!(params["b"], "x");
    /// assert_eq!(params["*"], "c/d/e");
    /// ```
    pub fn parse(path: &str) -> Result<Self, PatternError> {
        let normalized = normalize_path(path)?;

        let raw = tokenize(&normalized);
        let mut tokens = Vec::with_capacity(raw.len());
        for (index, piece) in raw.iter().enumerate() {
            let token = Token::parse(piece).ok_or_else(|| PatternError::EmptyParamName {
                path: path.to_string(),
                index,
            })?;
            if token == Token::Wildcard && index + 1 != raw.len() {
                return Err(PatternError::WildcardNotLast {
                    path: path.to_string(),
                });
            }
            tokens.push(token);
        }

        Ok(Self {
            path: normalized,
            tokens,
        })
    }

    /// Normalized template text
    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether the template ends with the wildcard placeholder
    pub fn has_wildcard(&self) -> bool {
        matches!(self.tokens.last(), Some(Token::Wildcard))
    }

    /// Placeholder names in template order, `*` included
    pub fn param_names(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Param(name) => Some(name.as_str()),
                Token::Wildcard => Some(WILDCARD_PARAM),
                Token::Literal(_) => None,
            })
            .collect()
    }

    /// Match a raw request path. A path that does not normalize never matches.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let normalized = normalize_path(path).ok()?;
        self.match_tokens(&tokenize(&normalized))
    }

    /// Match already tokenized request segments
    pub fn match_tokens(&self, candidate: &[&str]) -> Option<Params> {
        let fixed = if self.has_wildcard() {
            if candidate.len() < self.tokens.len() {
                return None;
            }
            self.tokens.len() - 1
        } else {
            if candidate.len() != self.tokens.len() {
                return None;
            }
            self.tokens.len()
        };

        let mut params = Params::new();
        for (token, segment) in self.tokens[..fixed].iter().zip(candidate) {
            match token {
                Token::Literal(text) if text == segment => {}
                Token::Literal(_) => return None,
                Token::Param(name) => {
                    params.insert(name.clone(), (*segment).to_string());
                }
                Token::Wildcard => return None,
            }
        }

        if fixed < self.tokens.len() {
            params.insert(WILDCARD_PARAM.to_string(), candidate[fixed..].join("/"));
        }

        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl std::str::FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
