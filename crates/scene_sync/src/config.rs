//! Configuration for a single simulation instance.

use crate::types::{PeerId, Role};
use serde::{Deserialize, Serialize};

/// Settings for one [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Identity stamped on local writes until a handshake assigns another (random by default)
    #[serde(default = "default_local_peer")]
    pub local_peer: PeerId,
    #[serde(default)]
    pub role: Role,
    /// Maximum entries in one `ReportValues` packet
    #[serde(default = "default_max_reports_per_packet")]
    pub max_reports_per_packet: usize,
    /// Tick period used by the async session
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_local_peer() -> PeerId {
    PeerId::random()
}

fn default_max_reports_per_packet() -> usize {
    256
}

fn default_tick_interval_ms() -> u64 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            local_peer: default_local_peer(),
            role: Role::default(),
            max_reports_per_packet: default_max_reports_per_packet(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SimulationConfig {
    /// Authoritative configuration using the `"server"` identity.
    pub fn server() -> Self {
        Self {
            local_peer: PeerId::server(),
            role: Role::Server,
            ..Self::default()
        }
    }

    pub fn client(peer: PeerId) -> Self {
        Self {
            local_peer: peer,
            role: Role::Client,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.local_peer.as_str().is_empty() {
            return Err("Local peer id cannot be empty".to_string());
        }

        if self.max_reports_per_packet == 0 {
            return Err("max_reports_per_packet must be greater than 0".to_string());
        }

        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_reports_per_packet, 256);
        assert_eq!(config.role, Role::Client);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = SimulationConfig::server();
        config.max_reports_per_packet = 0;
        assert!(config.validate().is_err());

        let config = SimulationConfig::client(PeerId::new(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"role":"server"}"#).unwrap();
        assert_eq!(config.role, Role::Server);
        assert!(config.local_peer.as_str().starts_with("peer-"));
        assert_eq!(config.tick_interval_ms, 50);
    }
}
