pub mod api;
pub mod clients;
pub mod config;
pub mod crypto;
pub mod db;
pub mod entities;
pub mod host;
pub mod services;
pub mod state;
pub mod wireguard;

use std::sync::Arc;

use anyhow::Context;
pub use config::Config;
use state::SharedState;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        None | Some("serve") => run_server(config).await,

        Some("gen-key") => {
            let pair = wireguard::generate_keypair();
            println!("PrivateKey = {}", pair.private_key);
            println!("PublicKey = {}", pair.public_key);
            Ok(())
        }

        Some("gen-secret") => {
            println!("{}", crypto::SecretBox::generate_key());
            Ok(())
        }

        Some("check-config") => {
            println!("Config OK");
            Ok(())
        }

        Some("help" | "-h" | "--help") => {
            print_help();
            Ok(())
        }

        Some(other) => {
            println!("Unknown command: {other}");
            print_help();
            Ok(())
        }
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let port = config.server.port;

    let shared = Arc::new(SharedState::new(config).await?);
    let state = api::create_app_state(shared).await;
    let app = api::router(state).await;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("burrow API listening on port {port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

fn print_help() {
    println!("burrow - WireGuard peer provisioning API");
    println!();
    println!("Usage: burrow [command]");
    println!();
    println!("Commands:");
    println!("  serve         Run the API server (default)");
    println!("  gen-key       Generate a WireGuard keypair and print it");
    println!("  gen-secret    Generate a config encryption key and print it");
    println!("  check-config  Load and validate the configuration, then exit");
    println!("  help          Show this help");
}
