//! routem HTTP server
//!
//! Serves a small set of demonstration routes. Configuration comes from an
//! optional JSON file with command line overrides.

use std::path::PathBuf;

use clap::Parser;
use http::StatusCode;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use routem_server::{
    error_handler, HandlerResult, HttpError, RequestContext, Router, ServerConfig, ServerError,
    ServerResult, Service, ServiceOptions,
};

#[derive(Parser, Debug)]
#[command(name = "routem")]
#[command(version)]
#[command(about = "Trie-routed HTTP server", long_about = None)]
struct Args {
    /// Path to JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override HTTP server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override HTTP server hostname
    #[arg(long)]
    hostname: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting routem v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            let config = ServerConfig::from_file(path)?;
            info!("Configuration loaded from {}", path.display());
            config
        }
        None => ServerConfig::default(),
    };

    if let Some(port) = args.port {
        info!("Overriding port: {}", port);
        config.port = port;
    }
    if let Some(hostname) = args.hostname {
        info!("Overriding hostname: {}", hostname);
        config.hostname = hostname;
    }

    config.validate()?;

    let dispatcher = routes(&config).build(config.dispatcher_config())?;
    let listener = tokio::net::TcpListener::bind(config.socket_addr()?).await?;
    let service = Service::serve(listener, dispatcher, ServiceOptions::from(&config))?;

    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        setup_signal_handlers().await;
        info!("Received shutdown signal");
        shutdown.cancel();
    });

    if let Err(e) = service.wait().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("routem shut down successfully");
    Ok(())
}

/// Demonstration routes
fn routes(config: &ServerConfig) -> Router {
    let mut router = config.router();

    router.error_handler(error_handler(|err: &HttpError, ctx: &RequestContext| {
        let status = err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        ctx.response().error(status, err.message());
        Ok(())
    }));
    router.get("/health", health);

    let api = router.group("/api");
    api.get("/hello/:name", hello);
    api.post("/echo", echo);

    router
}

async fn health(ctx: RequestContext) -> HandlerResult {
    ctx.response().text(StatusCode::OK, "ok");
    Ok(())
}

async fn hello(ctx: RequestContext) -> HandlerResult {
    let name = ctx.param("name").unwrap_or_default();
    ctx.response().text(StatusCode::OK, format!("Hello, {}!", name));
    Ok(())
}

async fn echo(ctx: RequestContext) -> HandlerResult {
    let body = ctx
        .body_str()
        .map_err(|_| HttpError::new(400, "request body is not valid UTF-8"))?;
    ctx.response().text(StatusCode::OK, body);
    Ok(())
}

/// Initialize structured logging with configurable level
fn init_logging(level: &str) -> ServerResult<()> {
    let env_filter = level
        .parse::<EnvFilter>()
        .map_err(|e| ServerError::Config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Setup Unix signal handlers for graceful shutdown
async fn setup_signal_handlers() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to setup SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to setup SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C");
    }
}
