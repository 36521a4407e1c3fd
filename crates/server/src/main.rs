use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use medidoc_server::api::AppState;
use medidoc_server::auth::JwtManager;
use medidoc_server::config::{JWT_SECRET_ENV, MedidocConfig};
use medidoc_server::error::ServerError;
use medidoc_vault::{TokenReaper, VaultBuilder};

/// Medidoc document vault HTTP server.
#[derive(Parser, Debug)]
#[command(name = "medidoc-server", about = "HTTP server for the medidoc document vault")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "medidoc.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

fn seconds(value: u64) -> Result<chrono::Duration, ServerError> {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| ServerError::Config(format!("duration out of range: {value}s")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration from TOML file, or use defaults if the file does not exist.
    let mut config: MedidocConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    // CLI overrides take precedence; the port also feeds the default external URL.
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let external_url = config.server.external_url();

    let secret = config.auth.resolve_secret().ok_or_else(|| {
        ServerError::Config(format!(
            "auth.jwt_secret or the {JWT_SECRET_ENV} environment variable must be set"
        ))
    })?;
    let auth = Arc::new(JwtManager::new(&secret, config.auth.issuer.clone()));

    let state_store = medidoc_server::state_factory::create_state(&config.state).await?;
    info!(backend = %config.state.backend, "state store initialized");

    let blobs = medidoc_server::blob_factory::create_blob_store(&config.blob).await?;
    info!(backend = %config.blob.backend, "blob store initialized");

    let relationships = medidoc_server::relationships::create_resolver(&config.relationships)?;

    let vault = VaultBuilder::new()
        .state(state_store)
        .blobs(blobs)
        .relationships(relationships)
        .relationship_timeout(Duration::from_millis(config.relationships.timeout_ms))
        .max_upload_bytes(config.documents.max_upload_bytes)
        .default_token_ttl(seconds(config.tokens.default_ttl_seconds)?)
        .max_token_ttl(seconds(config.tokens.max_ttl_seconds)?)
        .token_retention(seconds(config.tokens.retention_seconds)?)
        .base_url(external_url.clone())
        .build()
        .map_err(ServerError::from)?;
    let vault = Arc::new(vault);

    // Background token cleanup.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = TokenReaper::new(
        Arc::clone(&vault),
        Duration::from_secs(config.tokens.cleanup_interval_seconds.max(1)),
        shutdown_rx,
    );
    let reaper_handle = tokio::spawn(reaper.run());

    let state = AppState {
        vault,
        auth,
        external_url,
    };
    let app = medidoc_server::api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "medidoc-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(shutdown_timeout, reaper_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "token reaper did not stop before the shutdown timeout"
        );
    }

    info!("medidoc-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
