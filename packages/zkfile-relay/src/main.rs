//! zkfile Server
//!
//! A TCP server that lets clients prove their identity with a
//! zero-knowledge protocol before uploading a file:
//!
//! 1. **Identification**: the client picks Fiat–Shamir, Schnorr or
//!    Guillou–Quisquater and proves knowledge of its secret over one or
//!    more rounds. The secret never crosses the wire.
//!
//! 2. **File upload**: an accepted client sends one file encrypted with the
//!    keystream cipher. The server decrypts it into the output directory.
//!
//! 3. **Observability** (optional): `/health` and `/stats` over HTTP list
//!    the connections currently being served.
//!
//! Every connection runs in its own task; a failure in one never affects
//! the others.

mod handler;
mod protocol;
mod state;

use std::path::PathBuf;
use std::time::Duration;

use axum::{extract::State, http::Method, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use zkfile_core::{DeploymentParameters, ReceivedFiles};

use state::{ServerConfig, ServerState};

/// How long in-flight connections get to finish after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "zkfile-server", version, about = "Zero-knowledge authenticated file server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "ZKFILE_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "ZKFILE_BIND")]
    bind: String,

    /// Directory for received files
    #[arg(long, default_value = "received_files", env = "ZKFILE_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Deadline for each read and write, in seconds
    #[arg(long, default_value_t = 30, env = "ZKFILE_READ_TIMEOUT_SECS")]
    read_timeout_secs: u64,

    /// Identification rounds per connection; clients must use the same
    #[arg(long, default_value_t = 1, env = "ZKFILE_ROUNDS")]
    rounds: u32,

    /// Largest accepted ciphertext, in bytes
    #[arg(long, default_value_t = zkfile_core::network::DEFAULT_MAX_FILE_SIZE, env = "ZKFILE_MAX_FILE_SIZE")]
    max_file_size: u64,

    /// Serve /health and /stats on this port
    #[arg(long, env = "ZKFILE_STATS_PORT")]
    stats_port: Option<u16>,

    /// TOML file with the public scheme parameters and pinned keys.
    /// Defaults to the built-in reference deployment.
    #[arg(long, env = "ZKFILE_PARAMS")]
    params: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> zkfile_core::Result<ServerConfig> {
        let params = match &self.params {
            Some(path) => DeploymentParameters::load(path)?,
            None => DeploymentParameters::default(),
        };
        let config = ServerConfig {
            bind: self.bind,
            port: self.port,
            output_dir: self.output_dir,
            io_timeout: Duration::from_secs(self.read_timeout_secs),
            rounds: self.rounds,
            max_file_size: self.max_file_size,
            stats_port: self.stats_port,
            params,
        };
        config.session_config().validate()?;
        Ok(config)
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "zkfile_relay=info,zkfile_core=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(code = e.code(), "invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let files = match ReceivedFiles::open(&config.output_dir).await {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(dir = %config.output_dir.display(), "cannot open output directory: {}", e);
            std::process::exit(1);
        }
    };

    let state = ServerState::new(config, files);

    // ── Observability Endpoint ────────────────────────────────────────────

    if let Some(port) = state.config.stats_port {
        let addr = format!("{}:{}", state.config.bind, port);
        let app = stats_router(state.clone());
        tokio::spawn(async move {
            match TcpListener::bind(&addr).await {
                Ok(listener) => {
                    tracing::info!("stats endpoint listening on {}", addr);
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!("stats endpoint failed: {}", e);
                    }
                }
                Err(e) => tracing::error!("cannot bind stats endpoint {}: {}", addr, e),
            }
        });
    }

    // ── Accept Loop ───────────────────────────────────────────────────────

    let addr = format!("{}:{}", state.config.bind, state.config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        output_dir = %state.config.output_dir.display(),
        rounds = state.config.rounds,
        "zkfile server starting on {}",
        addr
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        handler::handle_connection(stream, peer, state).await;
                    });
                }
                Err(e) => tracing::warn!("accept failed: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(
                    active = state.active_count(),
                    "shutdown requested, no longer accepting connections"
                );
                break;
            }
        }
    }

    // Let in-flight sessions finish
    let drain = async {
        while state.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(active = state.active_count(), "shutdown grace period expired");
    }
}

// ── Route Handlers ────────────────────────────────────────────────────────────

fn stats_router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "zkfile-server",
        "version": env!("CARGO_PKG_VERSION"),
        "core": zkfile_core::build_info(),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.stats())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
