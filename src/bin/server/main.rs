//! tsdataset HTTP Server
//!
//! Serves dataset queries over an in-memory stream store seeded from a JSON
//! file at startup.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/streams` - Known stream paths
//! - `POST /api/v1/query/dataset` - Build a dataset (body: DatasetQuery JSON)
//!
//! # CLI Commands
//!
//! - `start` - Start the HTTP server (default if no command specified)
//! - `check-config` - Validate configuration file
//! - `query --file <query.json>` - Run one dataset query and print the rows
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `--config` flag
//! 2. `TSDATASET_CONFIG` environment variable (path to TOML file)
//! 3. `./tsdataset.toml` in current directory
//! 4. Default configuration

mod config;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use config::{load_config, ConfigSource};
use handlers::AppState;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::{debug, info, warn};
use tsdataset::{
    config::ApplicationConfig,
    query::DatasetQuery,
    storage::InMemoryStreamAccessor,
    transform::{ExpressionEvaluator, TransformEvaluator},
};

// =============================================================================
// Router and Server Setup
// =============================================================================

/// Build the application router
fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_request_bytes;

    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Stream catalog
        .route("/api/v1/streams", get(handlers::list_streams))
        // Dataset API
        .route("/api/v1/query/dataset", post(handlers::query_dataset))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
}

/// Graceful shutdown signal handler
///
/// A failed signal registration is logged and that signal is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(
                error = %e,
                "Ctrl+C handler installation failed - graceful shutdown unavailable"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "SIGTERM handler installation failed - SIGTERM shutdown unavailable"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

/// Create the stream store, loading the seed file if one is configured
fn init_store(config: &ApplicationConfig) -> tsdataset::Result<Arc<InMemoryStreamAccessor>> {
    let store = InMemoryStreamAccessor::new();
    if let Some(seed) = &config.data.seed_file {
        let count = store.load_json_file(seed)?;
        info!(file = %seed.display(), streams = count, "Seeded stream store");
    } else {
        debug!("No seed file configured, starting with an empty store");
    }
    tsdataset::metrics::update_stream_count(store.stream_paths().len());
    Ok(Arc::new(store))
}

/// Initialize tracing with `RUST_LOG`, falling back to the configured level
///
/// Logs go to stderr so `query` output on stdout stays machine readable.
fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

// =============================================================================
// CLI Definition
// =============================================================================

/// tsdataset - dataset queries over time-series streams
#[derive(Parser)]
#[command(name = "tsdataset-server")]
#[command(version)]
#[command(about = "Align irregular time-series streams into tabular datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides TSDATASET_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long, global = true)]
    listen: Option<String>,

    /// Override the stream seed file
    #[arg(short, long, global = true)]
    seed: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Validate configuration file without starting the server
    CheckConfig,

    /// Run a dataset query against the seeded store and print the rows as JSON
    Query {
        /// File containing a DatasetQuery JSON document
        #[arg(short, long)]
        file: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
}

impl Cli {
    /// Load configuration and apply command line overrides
    fn resolve_config(&self) -> tsdataset::Result<(ApplicationConfig, ConfigSource)> {
        let (mut config, source) = load_config(self.config.as_deref())?;
        if let Some(listen) = &self.listen {
            config.server.listen_addr = listen.clone();
        }
        if let Some(seed) = &self.seed {
            config.data.seed_file = Some(seed.clone());
        }
        config.validate()?;
        Ok((config, source))
    }
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Validate configuration and print summary
fn cmd_check_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (config, source) = cli.resolve_config()?;

    println!("Configuration is valid!");
    println!("  Source: {}", source);
    println!();
    println!("Server Settings:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Log level: {}", config.server.log_level);
    println!("  Max request size: {} bytes", config.server.max_request_bytes);
    println!();
    println!("Query Settings:");
    println!("  Max grid points: {}", config.query.max_grid_points);
    println!();
    println!("Data:");
    match &config.data.seed_file {
        Some(seed) => println!("  Seed file: {}", seed.display()),
        None => println!("  Seed file: (none)"),
    }

    Ok(())
}

/// Run one dataset query and print the result
/// Decode a query file and reject a malformed post-transform before any
/// stream is opened
fn parse_query_file(contents: &str) -> Result<DatasetQuery, Box<dyn std::error::Error>> {
    let query: DatasetQuery = serde_json::from_str(contents)?;
    if let Some(expression) = query.transform_expression() {
        TransformEvaluator::new().check(expression)?;
    }
    Ok(query)
}

fn cmd_query(cli: &Cli, file: &Path, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, source) = cli.resolve_config()?;
    init_tracing(&config.server.log_level);
    debug!(source = %source, "Configuration loaded");

    let contents = std::fs::read_to_string(file)?;
    let query = parse_query_file(&contents)?;

    let state = AppState::new(config.clone(), init_store(&config)?);
    let rows = state.execute(&query)?;

    let output = if pretty {
        serde_json::to_string_pretty(&rows)?
    } else {
        serde_json::to_string(&rows)?
    };
    println!("{}", output);
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Route to appropriate command handler
    match &cli.command {
        Some(Commands::CheckConfig) => return cmd_check_config(&cli),
        Some(Commands::Query { file, pretty }) => return cmd_query(&cli, file, *pretty),
        Some(Commands::Start) | None => {
            // Continue with server startup below
        }
    }

    let (config, source) = cli.resolve_config()?;
    init_tracing(&config.server.log_level);

    info!("Starting tsdataset server v{}", env!("CARGO_PKG_VERSION"));
    info!(source = %source, "Configuration loaded");
    debug!(
        listen_addr = %config.server.listen_addr,
        max_grid_points = config.query.max_grid_points,
        "Effective configuration"
    );

    tsdataset::metrics::init();
    let store = init_store(&config)?;

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let state = Arc::new(AppState::new(config, store));
    let app = build_router(state);

    info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tsdataset::types::Datapoint;

    fn test_router(max_request_bytes: usize) -> Router {
        let store = InMemoryStreamAccessor::new();
        store
            .insert(
                "a/b/c",
                vec![Datapoint::new(1.0, json!(1)), Datapoint::new(2.0, json!(2))],
            )
            .unwrap();
        store
            .insert("d/e/f", vec![Datapoint::new(1.1, json!("a"))])
            .unwrap();

        let mut config = ApplicationConfig::default();
        config.server.max_request_bytes = max_request_bytes;
        build_router(Arc::new(AppState::new(config, Arc::new(store))))
    }

    async fn post_query(app: Router, body: String) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/query/dataset")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = test_router(1024)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["streams"], 2);
    }

    #[tokio::test]
    async fn test_list_streams_endpoint() {
        let response = test_router(1024)
            .oneshot(Request::builder().uri("/api/v1/streams").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body["streams"],
            json!([{"path": "a/b/c", "datapoints": 2}, {"path": "d/e/f", "datapoints": 1}])
        );
    }

    #[tokio::test]
    async fn test_dataset_query_endpoint() {
        let query = json!({
            "stream": "a/b/c",
            "dataset": {"y": {"stream": "d/e/f", "interpolator": "closest"}}
        });
        let (status, body) = post_query(test_router(1 << 20), query.to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{"t": 1.0, "d": {"x": 1, "y": "a"}}, {"t": 2.0, "d": {"x": 2, "y": "a"}}])
        );
    }

    #[tokio::test]
    async fn test_dataset_query_errors() {
        let missing = json!({
            "stream": "a/b/c",
            "dataset": {"y": {"stream": "nope", "interpolator": "closest"}}
        });
        let (status, body) = post_query(test_router(1 << 20), missing.to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "StreamNotFound");

        let empty = json!({"stream": "a/b/c", "dataset": {}});
        let (status, body) = post_query(test_router(1 << 20), empty.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "EmptyDataset");

        let (status, body) = post_query(test_router(1 << 20), "{not json".to_string()).await;
        assert!(status.is_client_error());
        assert!(body.get("kind").is_none());
    }

    #[tokio::test]
    async fn test_dataset_query_rejects_ambiguous_element() {
        let both = json!({
            "stream": "a/b/c",
            "dataset": {"y": {"stream": "d/e/f", "merge": [{"stream": "a/b/c"}], "interpolator": "closest"}}
        });
        let (status, _) = post_query(test_router(1 << 20), both.to_string()).await;
        assert!(status.is_client_error());

        let neither = json!({"stream": "a/b/c", "dataset": {"y": {"interpolator": "closest"}}});
        let (status, body) = post_query(test_router(1 << 20), neither.to_string()).await;
        assert!(status.is_client_error());
        assert!(body.get("kind").is_none());
    }

    #[test]
    fn test_query_file_checks_post_transform() {
        let base = json!({
            "stream": "a/b/c",
            "dataset": {"y": {"stream": "d/e/f", "interpolator": "closest"}}
        });

        let mut valid = base.clone();
        valid["post_transform"] = json!("$('x') + $('y')");
        let query = parse_query_file(&valid.to_string()).unwrap();
        assert_eq!(query.transform_expression(), Some("$('x') + $('y')"));

        let mut broken = base.clone();
        broken["post_transform"] = json!("$('x') ==");
        let err = parse_query_file(&broken.to_string()).unwrap_err();
        assert!(err.to_string().contains("Parse error"), "{}", err);

        assert!(parse_query_file(&base.to_string()).is_ok());
    }

    #[tokio::test]
    async fn test_request_body_limit() {
        let query = json!({
            "stream": "a/b/c",
            "dataset": {"y": {"stream": "d/e/f", "interpolator": "closest"}},
            "post_transform": "x".repeat(4096)
        });
        let (status, _) = post_query(test_router(1024), query.to_string()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
