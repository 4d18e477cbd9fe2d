//! Configuration management for the scene host.
//!
//! This module handles loading, validation, and conversion of host
//! configuration from TOML files.

use scene_sync::{PeerId, Role, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_clients() -> usize {
    2
}

fn default_ticks() -> u64 {
    200
}

fn default_write_interval() -> u64 {
    5
}

fn default_max_reports_per_packet() -> usize {
    256
}

fn default_convergence_timeout_ms() -> u64 {
    5_000
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Soak session settings
    #[serde(default)]
    pub session: SessionSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Shape and duration of the soak session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Tick interval in milliseconds for every simulation
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Number of client simulations joining the server
    #[serde(default = "default_clients")]
    pub clients: usize,
    /// Ticks to run before checking convergence
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Every participant writes once per this many ticks
    #[serde(default = "default_write_interval")]
    pub write_interval_ticks: u64,
    /// Maximum entries in one `ReportValues` packet
    #[serde(default = "default_max_reports_per_packet")]
    pub max_reports_per_packet: usize,
    /// How long to wait for replicas to agree after the last write
    #[serde(default = "default_convergence_timeout_ms")]
    pub convergence_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            clients: default_clients(),
            ticks: default_ticks(),
            write_interval_ticks: default_write_interval(),
            max_reports_per_packet: default_max_reports_per_packet(),
            convergence_timeout_ms: default_convergence_timeout_ms(),
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Builds the configuration for one participant.
    pub fn to_simulation_config(&self, peer: PeerId, role: Role) -> SimulationConfig {
        SimulationConfig {
            local_peer: peer,
            role,
            max_reports_per_packet: self.session.max_reports_per_packet,
            tick_interval_ms: self.session.tick_interval_ms,
        }
    }

    /// Validates the configuration settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.session.tick_interval_ms == 0 {
            return Err("session.tick_interval_ms must be greater than 0".to_string());
        }

        if self.session.clients == 0 {
            return Err("session.clients must be at least 1".to_string());
        }

        if self.session.write_interval_ticks == 0 {
            return Err("session.write_interval_ticks must be greater than 0".to_string());
        }

        if self.session.max_reports_per_packet == 0 {
            return Err("session.max_reports_per_packet must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
