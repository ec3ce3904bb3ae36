// Kotoba session engine
// Main entry point for the kotoba binary

use clap::Parser;
use kotoba_engine::cli::{Cli, Command};
use kotoba_engine::config::Config;
use kotoba_engine::handlers::{
    handle_chat, handle_history, handle_serve, handle_sessions, OutputFormat,
};
use kotoba_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Kotoba engine v{}", env!("CARGO_PKG_VERSION"));

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the CLI override or config-driven level
    // (only takes effect if RUST_LOG env var is not set)
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    match cli.command {
        Command::Serve { host, port } => handle_serve(&config, host, port).await,

        Command::Chat {
            user,
            session,
            message,
        } => handle_chat(&config, user, session, message, format).await,

        Command::Sessions { user_id } => handle_sessions(&config, user_id, format).await,

        Command::History { session_id } => handle_history(&config, session_id, format).await,
    }
}
