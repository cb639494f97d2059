//! # beacon-agent
//!
//! Beacon signaling hub binary. Loads settings, starts the HTTP/WebSocket
//! server, and waits for Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_auth::TokenVerifier;
use beacon_server::{BeaconServer, ServerConfig};
use beacon_settings::{BeaconSettings, LoggingSettings};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

/// Beacon signaling hub.
#[derive(Parser, Debug)]
#[command(name = "beacon", about = "Real-time signaling hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.beacon/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a signed access token for a user id.
    Token {
        /// Numeric user id the token authenticates.
        user_id: u64,

        /// Email claim.
        #[arg(long)]
        email: Option<String>,

        /// Lifetime in hours.
        #[arg(long, default_value = "168")]
        ttl_hours: u64,
    },
}

impl Cli {
    fn settings_file(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(beacon_settings::settings_path)
    }

    fn apply_overrides(&self, settings: &mut BeaconSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// File, then environment, then command line.
fn load_settings(cli: &Cli) -> Result<BeaconSettings> {
    let path = cli.settings_file();
    let mut settings = beacon_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply_overrides(&mut settings);
    beacon_settings::validate(&settings).context("Invalid settings")?;
    Ok(settings)
}

fn init_logging(logging: &LoggingSettings) {
    if logging.json {
        beacon_core::logging::init_json_subscriber(&logging.level);
    } else {
        beacon_core::logging::init_subscriber(&logging.level);
    }
}

fn issue_token(
    settings: &BeaconSettings,
    user_id: u64,
    email: Option<String>,
    ttl_hours: u64,
) -> Result<String> {
    let ttl = Duration::from_secs(ttl_hours.saturating_mul(3600));
    TokenVerifier::new(&settings.auth.jwt_secret)
        .issue(user_id, email, ttl)
        .context("Failed to sign token")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    if let Some(Command::Token {
        user_id,
        ref email,
        ttl_hours,
    }) = cli.command
    {
        let token = issue_token(&settings, user_id, email.clone(), ttl_hours)?;
        println!("{token}");
        return Ok(());
    }

    init_logging(&settings.logging);
    if settings.auth.uses_default_secret() {
        warn!("using the built-in JWT secret; set BEACON_JWT_SECRET for any shared deployment");
    }

    let metrics_handle =
        beacon_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let config = ServerConfig::from_settings(&settings);
    let verifier = TokenVerifier::new(&settings.auth.jwt_secret);
    let server = BeaconServer::new(config, verifier).with_metrics(metrics_handle);

    let (addr, server_task) = server.listen().await.context("Failed to start server")?;
    info!(%addr, "beacon ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    server.shutdown_gracefully(server_task).await;
    info!("beacon stopped");
    Ok(())
}
