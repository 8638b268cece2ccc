//! Route file support
//!
//! A `switchyard.yml` file describes the listener and the routes it serves.
//! Routes are registered in file order; `priority: first` moves a route ahead
//! of everything registered before it.

use anyhow::{bail, Context, Result};
use http::{HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use switchyard_http::{reject, respond, HttpConfigurator, HttpRouter, HttpRouterBuilder};
use switchyard_router::{DuplicatePolicy, PathPattern, STANDARD_METHODS};

/// Default file name looked up by the CLI
pub const DEFAULT_ROUTE_FILE: &str = "switchyard.yml";

/// Name of the outermost router
pub const ROOT_ROUTER: &str = "ROOT";

/// Route file format
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouteFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub routing: RoutingSection,

    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Interim status for `Expect: 100-continue`; null disables it
    #[serde(default = "default_continue_status")]
    pub continue_status: Option<u16>,

    /// Largest request head accepted before the request is rejected
    #[serde(default = "default_max_head_bytes")]
    pub max_head_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_continue_status() -> Option<u16> {
    Some(100)
}

fn default_max_head_bytes() -> usize {
    8192
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            continue_status: default_continue_status(),
            max_head_bytes: default_max_head_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingSection {
    #[serde(default)]
    pub duplicates: DuplicateMode,
}

/// What to do when a route name is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    #[default]
    Overwrite,
    Reject,
}

impl From<DuplicateMode> for DuplicatePolicy {
    fn from(mode: DuplicateMode) -> Self {
        match mode {
            DuplicateMode::Overwrite => DuplicatePolicy::Overwrite,
            DuplicateMode::Reject => DuplicatePolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    First,
    #[default]
    Last,
}

/// A single route definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub name: String,

    pub path: String,

    /// Methods served; empty serves every method
    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Fixed response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respond: Option<RespondAction>,

    /// Fixed failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<FailAction>,

    /// Routes of a nested router mounted on this route
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondAction {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub body: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "text/plain; charset=utf-8".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailAction {
    #[serde(default = "default_fail_status")]
    pub status: u16,

    #[serde(default)]
    pub message: String,
}

fn default_fail_status() -> u16 {
    500
}

impl RouteFile {
    /// Load a route file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read route file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Invalid route file: {:?}", path))
    }

    /// Parse a route file from YAML
    pub fn parse(content: &str) -> Result<Self> {
        let file: RouteFile =
            serde_yaml::from_str(content).context("Failed to parse YAML route file")?;

        file.validate()?;
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize route file")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write route file: {:?}", path))?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if let Some(code) = self.server.continue_status {
            let status = parse_status(code)?;
            if !status.is_informational() {
                bail!("continue_status must be a 1xx status, got {}", code);
            }
        }

        if self.server.max_head_bytes < 64 {
            bail!(
                "max_head_bytes must be at least 64, got {}",
                self.server.max_head_bytes
            );
        }

        validate_routes(&self.routes, self.routing.duplicates)
    }

    /// Build the router described by the file
    pub fn router(&self) -> Result<HttpRouter> {
        let continue_status = self
            .server
            .continue_status
            .map(parse_status)
            .transpose()?;

        let builder = HttpRouter::builder(ROOT_ROUTER).continue_status(continue_status);
        let builder = self.register(builder, &self.routes)?;
        builder.build().context("Failed to build router")
    }

    fn register(&self, mut builder: HttpRouterBuilder, routes: &[RouteEntry]) -> Result<HttpRouterBuilder> {
        builder = builder.duplicates(self.routing.duplicates.into());

        for entry in routes {
            let methods = entry.parsed_methods()?;
            for method in &methods {
                if !STANDARD_METHODS.contains(method) {
                    builder = builder.method(method.clone());
                }
            }

            let configurator = self.configurator(entry)?;
            builder = match entry.priority {
                Priority::First => builder.route_first(methods, &entry.name, &entry.path, configurator),
                Priority::Last => builder.route(methods, &entry.name, &entry.path, configurator),
            };
        }

        Ok(builder)
    }

    fn configurator(&self, entry: &RouteEntry) -> Result<HttpConfigurator> {
        if let Some(action) = &entry.respond {
            return Ok(respond(
                parse_status(action.status)?,
                action.content_type.clone(),
                action.body.clone(),
            ));
        }

        if let Some(action) = &entry.fail {
            return Ok(reject(parse_status(action.status)?, action.message.clone()));
        }

        let nested = self.register(HttpRouter::builder(entry.name.clone()).nested(), &entry.routes)?;
        let nested = nested
            .build()
            .with_context(|| format!("Failed to build nested router for route '{}'", entry.name))?;
        Ok(nested.mount())
    }
}

impl RouteEntry {
    pub fn parsed_methods(&self) -> Result<Vec<Method>> {
        self.methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.to_uppercase().as_bytes())
                    .with_context(|| format!("Invalid method '{}' for route '{}'", method, self.name))
            })
            .collect()
    }
}

fn parse_status(code: u16) -> Result<StatusCode> {
    StatusCode::from_u16(code).with_context(|| format!("Invalid status code: {}", code))
}

fn validate_routes(routes: &[RouteEntry], duplicates: DuplicateMode) -> Result<()> {
    let mut names = HashSet::new();

    for entry in routes {
        if entry.name.trim().is_empty() {
            bail!("Route with path '{}' has no name", entry.path);
        }

        if !names.insert(entry.name.as_str()) && duplicates == DuplicateMode::Reject {
            bail!("Duplicate route name: {}", entry.name);
        }

        PathPattern::parse(&entry.path)
            .with_context(|| format!("Invalid path for route '{}'", entry.name))?;
        entry.parsed_methods()?;

        let actions = [
            entry.respond.is_some(),
            entry.fail.is_some(),
            !entry.routes.is_empty(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if actions != 1 {
            bail!(
                "Route '{}' needs exactly one of respond, fail or routes",
                entry.name
            );
        }

        if let Some(action) = &entry.respond {
            parse_status(action.status)?;
            HeaderValue::from_str(&action.content_type).with_context(|| {
                format!(
                    "Invalid content type '{}' for route '{}'",
                    action.content_type, entry.name
                )
            })?;
        }

        if let Some(action) = &entry.fail {
            let status = parse_status(action.status)?;
            if !(status.is_client_error() || status.is_server_error()) {
                bail!(
                    "Route '{}' must fail with a 4xx or 5xx status, got {}",
                    entry.name,
                    action.status
                );
            }
        }

        validate_routes(&entry.routes, duplicates)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_file() {
        let yaml = r#"
routes:
  - name: index
    path: /articles
    methods: [GET]
    respond:
      body: "articles"
"#;
        let file = RouteFile::parse(yaml).unwrap();
        assert_eq!(file.server.bind, "127.0.0.1:8080");
        assert_eq!(file.server.continue_status, Some(100));
        assert_eq!(file.server.max_head_bytes, 8192);
        assert_eq!(file.routing.duplicates, DuplicateMode::Overwrite);

        let route = &file.routes[0];
        assert_eq!(route.priority, Priority::Last);
        let respond = route.respond.as_ref().unwrap();
        assert_eq!(respond.status, 200);
        assert_eq!(respond.content_type, "text/plain; charset=utf-8");
    }

    #[test]
    fn test_router_from_file() {
        let yaml = r#"
server:
  bind: "0.0.0.0:9000"
  continue_status: null
routes:
  - name: show
    path: /articles/:id
    methods: [get]
    respond:
      body: "show"
  - name: new
    path: /articles/new
    methods: [GET]
    priority: first
    respond:
      body: "new"
  - name: api
    path: /api/:*
    routes:
      - name: users
        path: /api/users
        methods: [GET]
        respond:
          body: "users"
"#;
        let file = RouteFile::parse(yaml).unwrap();
        assert_eq!(file.server.continue_status, None);

        let router = file.router().unwrap();
        let registry = router.registry();
        assert_eq!(registry.count(), 3);
        assert_eq!(registry.lookup(&Method::GET, "/articles/new").unwrap().name(), "new");
        assert_eq!(registry.lookup(&Method::GET, "/articles/7").unwrap().name(), "show");
        assert_eq!(registry.lookup(&Method::POST, "/api/users").unwrap().name(), "api");
    }

    #[test]
    fn test_extension_method() {
        let yaml = r#"
routes:
  - name: purge
    path: /cache/:*
    methods: [PURGE]
    respond:
      status: 204
"#;
        let router = RouteFile::parse(yaml).unwrap().router().unwrap();
        let purge = Method::from_bytes(b"PURGE").unwrap();
        assert_eq!(router.registry().lookup(&purge, "/cache/a/b").unwrap().name(), "purge");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
routing:
  duplicates: reject
routes:
  - name: a
    path: /a
    respond: {}
  - name: a
    path: /b
    respond: {}
"#;
        let err = RouteFile::parse(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate route name: a"));
    }

    #[test]
    fn test_duplicate_names_overwrite() {
        let yaml = r#"
routes:
  - name: a
    path: /a
    respond: {}
  - name: a
    path: /b
    respond: {}
"#;
        let router = RouteFile::parse(yaml).unwrap().router().unwrap();
        assert_eq!(router.registry().count(), 1);
        assert!(router.registry().lookup(&Method::GET, "/b").is_ok());
        assert!(router.registry().lookup(&Method::GET, "/a").is_err());
    }

    #[test]
    fn test_invalid_routes() {
        let no_slash = "routes:\n  - name: a\n    path: a\n    respond: {}\n";
        assert!(RouteFile::parse(no_slash).is_err());

        let no_action = "routes:\n  - name: a\n    path: /a\n";
        let err = RouteFile::parse(no_action).unwrap_err();
        assert!(format!("{:#}", err).contains("exactly one of"));

        let two_actions =
            "routes:\n  - name: a\n    path: /a\n    respond: {}\n    fail: {status: 500}\n";
        assert!(RouteFile::parse(two_actions).is_err());

        let ok_fail = "routes:\n  - name: a\n    path: /a\n    fail: {status: 200}\n";
        assert!(RouteFile::parse(ok_fail).is_err());

        let bad_bind = "server:\n  bind: nowhere\n";
        assert!(RouteFile::parse(bad_bind).is_err());

        let bad_continue = "server:\n  continue_status: 200\n";
        assert!(RouteFile::parse(bad_continue).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_ROUTE_FILE);

        let yaml = r#"
routes:
  - name: health
    path: /health
    methods: [GET]
    respond:
      body: "ok"
"#;
        let file = RouteFile::parse(yaml).unwrap();
        file.save(&path).unwrap();

        let loaded = RouteFile::load(&path).unwrap();
        assert_eq!(loaded.routes.len(), 1);
        assert_eq!(loaded.routes[0].name, "health");
        assert_eq!(loaded.routes[0].respond.as_ref().unwrap().body, "ok");
    }
}
