//! Switchyard CLI - serve, check and reverse-route a route file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use switchyard::{HttpServer, RouteFile, ServerConfig, DEFAULT_ROUTE_FILE};
use switchyard_router::Params;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Switchyard - routed HTTP/1.x server
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Switchyard - routed HTTP/1.x server")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, env = "SWITCHYARD_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the routes of a route file
    #[command(long_about = r#"
Listen for HTTP/1.x connections and route every request through the
routes described in the route file.

EXAMPLES:
  # Serve ./switchyard.yml
  switchyard serve

  # Serve another file on another address
  switchyard serve --config routes.yml --bind 0.0.0.0:9000

ENVIRONMENT VARIABLES:
  SWITCHYARD_CONFIG      Route file path
  SWITCHYARD_BIND        Listen address, overrides server.bind
  SWITCHYARD_LOG_LEVEL   Log level
    "#)]
    Serve {
        /// Route file
        #[arg(short, long, env = "SWITCHYARD_CONFIG", default_value = DEFAULT_ROUTE_FILE)]
        config: PathBuf,

        /// Listen address, overrides the route file
        #[arg(long, env = "SWITCHYARD_BIND")]
        bind: Option<String>,
    },

    /// Validate a route file and list its routes
    Check {
        /// Route file
        #[arg(short, long, env = "SWITCHYARD_CONFIG", default_value = DEFAULT_ROUTE_FILE)]
        config: PathBuf,

        /// Print the routes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate the path of a named route
    Path {
        /// Route file
        #[arg(short, long, env = "SWITCHYARD_CONFIG", default_value = DEFAULT_ROUTE_FILE)]
        config: PathBuf,

        /// Route name
        name: String,

        /// Parameters as key=value; leftovers become the query string
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

/// One line of `check --json` output
#[derive(Debug, Serialize)]
struct RouteSummary {
    name: String,
    /// Empty for routes serving every method
    methods: Vec<String>,
    path: String,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool, log_level: Option<&str>) {
    let log_level = log_level.unwrap_or(if verbose { "debug" } else { "info" });

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_level.as_deref());

    match cli.command {
        Commands::Serve { config, bind } => {
            let mut file = RouteFile::load(&config)?;
            if let Some(bind) = bind {
                file.server.bind = bind;
            }

            let router = file.router()?;
            let server = HttpServer::new(
                ServerConfig {
                    bind_addr: file.bind_addr()?,
                    max_head_bytes: file.server.max_head_bytes,
                },
                router,
            );

            info!("Switchyard starting with {} route(s) from {:?}", file.routes.len(), config);
            server
                .start(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received Ctrl+C, shutting down...");
                    }
                })
                .await
                .context("Server failed")?;

            info!("Switchyard stopped");
            Ok(())
        }
        Commands::Check { config, json } => {
            let file = RouteFile::load(&config)?;
            let router = file.router()?;
            let routes = router.registry().routes();

            if json {
                let summary: Vec<RouteSummary> = routes
                    .iter()
                    .map(|route| RouteSummary {
                        name: route.name().to_string(),
                        methods: route
                            .method_set()
                            .iter()
                            .map(|method| method.to_string())
                            .collect(),
                        path: route.pattern().to_string(),
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).context("Failed to serialize routes")?
                );
                return Ok(());
            }

            println!("{:?}: OK, listening on {}", config, file.server.bind);
            for route in routes {
                println!("  {}", route);
            }
            Ok(())
        }
        Commands::Path {
            config,
            name,
            params,
        } => {
            let router = RouteFile::load(&config)?.router()?;
            let params: Params = params.into_iter().collect();

            let path = router
                .generate_path(&name, &params)
                .with_context(|| format!("No route named '{}' accepts these parameters", name))?;
            println!("{}", path);
            Ok(())
        }
    }
}
