//! Hookwire: controller dispatch server
//!
//! Serves the demo controllers over HTTP. Every request path
//! `/Controller/action` is dispatched through the controller lifecycle:
//! CSRF setup, middleware chain, action, after-action hook and cleanup.
//!
//! Usage:
//!   hookwire                                   # Default port 9501
//!   hookwire --port 8080                       # Custom port
//!   hookwire --token mysecret                  # Fixed auth token
//!   hookwire --log-file /tmp/hookwire.log      # Log to a file

mod app;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hookwire_server::DispatcherConfig;
use hookwire_session::{SessionConfig, generate_token};
use hookwire_transport::{TransportConfig, TransportServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hookwire", about = "Hookwire controller dispatch server")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "9501")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Bearer token accepted by the auth middleware (random if not provided)
    #[arg(long)]
    token: Option<String>,

    /// Idle controller instances kept per controller type
    #[arg(long, default_value = "64")]
    pool_capacity: usize,

    /// Forward hops followed before answering 508
    #[arg(long, default_value = "8")]
    max_forwards: usize,

    /// Session key holding the CSRF token
    #[arg(long, default_value = "csrf_token")]
    csrf_key: String,

    /// Session cookie name
    #[arg(long, default_value = "HOOKSESSID")]
    cookie_name: String,

    /// Seconds an idle session is kept
    #[arg(long, default_value = "1440")]
    session_idle_secs: u64,

    /// Enable permissive CORS
    #[arg(long)]
    cors: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Write logs to a file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let Some(log_path) = &cli.log_file else {
        if cli.json_logs {
            builder.json().init();
        } else {
            builder.init();
        }
        return Ok(());
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;
    let writer = std::sync::Mutex::new(file);

    if cli.json_logs {
        builder.json().with_writer(writer).with_ansi(false).init();
    } else {
        builder.with_writer(writer).with_ansi(false).init();
    }
    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let token = cli.token.clone().unwrap_or_else(generate_token);

    let dispatcher_config = DispatcherConfig {
        csrf_key: cli.csrf_key.clone(),
        pool_capacity: cli.pool_capacity,
        session: SessionConfig {
            cookie_name: cli.cookie_name.clone(),
            idle_timeout: Duration::from_secs(cli.session_idle_secs),
            ..SessionConfig::default()
        },
    };
    let dispatcher = app::build_dispatcher(dispatcher_config, &token)?;

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        max_forwards: cli.max_forwards,
        verbose_logging: cli.verbose,
        ..TransportConfig::default()
    };
    let mut transport = TransportServer::start(transport_config, dispatcher)
        .await
        .context("failed to start transport")?;

    let base_url = format!("http://{}:{}", cli.hostname, transport.port());
    info!("Hookwire ready on {base_url}");

    println!();
    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Server running!");
    println!();
    println!("  Endpoints:");
    println!("    {base_url}/Index/index");
    println!("    {base_url}/Account/profile");
    println!("    {base_url}/health");
    println!();
    println!("  Auth token:");
    println!("    {token}");
    println!();
    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await?;

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
    Ok(())
}
