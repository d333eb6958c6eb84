use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

mod server;

use server::settings::{Settings, SettingsOverrides};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[command(flatten)]
        overrides: SettingsOverrides,
    },
    /// Check configuration for errors and unused options
    CheckConfig {
        #[command(flatten)]
        overrides: SettingsOverrides,
    },
}

/// Load layered settings, then apply CLI flags and validate the result
fn load_settings(overrides: &SettingsOverrides) -> Result<Settings> {
    let mut settings = Settings::new().context("Failed to load configuration")?;
    overrides.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise the configured log level is applied once settings are loaded
    let rust_log = std::env::var("RUST_LOG").ok();
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(
        rust_log.clone().unwrap_or_else(|| "info".into()),
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { overrides } => {
            let settings = load_settings(&overrides)?;
            if rust_log.is_none() {
                filter_handle
                    .reload(EnvFilter::new(&settings.server.log_level))
                    .context("Failed to apply log level")?;
            }

            // kube-rs needs a process-wide rustls crypto provider for HTTPS
            rustls::crypto::ring::default_provider()
                .install_default()
                .ok();

            info!(
                version = env!("CARGO_PKG_VERSION"),
                auth_method = %settings.auth.method,
                "Starting LM evaluation backend"
            );
            server::run_server(settings).await
        }
        Commands::CheckConfig { overrides } => {
            println!("Checking configuration...");
            match load_settings(&overrides) {
                Ok(_) => {
                    println!("✓ Configuration is valid");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Configuration error: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
