//! # Scene Host - Soak Runner
//!
//! Runs one authoritative simulation and several client simulations in a
//! single process, wired together by the loopback transport. Every
//! participant keeps writing to a shared scene; at the end the host checks
//! that all replicas converged to the same state.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! scene_host
//!
//! # Specify custom configuration
//! scene_host --config soak.toml
//!
//! # Override specific settings
//! scene_host --clients 8 --ticks 2000 --log-level debug
//!
//! # JSON logging
//! scene_host --json-logs
//! ```
//!
//! ## Configuration
//!
//! The host loads configuration from a TOML file (default: `scene_host.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Exit Codes
//!
//! * **0**: All replicas converged
//! * **1**: Startup failed, or replicas diverged

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod scene;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Parses arguments, sets up logging and runs the soak session.
///
/// Called from an async context; it does not start a runtime itself.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, before the full load.
    let mut log_settings = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default()
        .logging;
    if let Some(level) = &args.log_level {
        log_settings.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&log_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{LoggingSettings, SessionSettings};
