//! Configuration for the netsyncd demo

use anyhow::Context;
use clap::{Parser, ValueEnum};
use netsync_core::NetworkConfig;
use std::path::PathBuf;

/// How the local server participates
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Server that also plays and acknowledges scene switches
    Host,
    /// Dedicated server with remote clients only
    Server,
}

/// netsyncd - replicated object session over an in-process loopback
#[derive(Parser, Debug, Clone)]
#[command(name = "netsyncd")]
#[command(about = "Object replication and scene switching over a loopback mesh")]
pub struct Config {
    /// Server role
    #[arg(long, value_enum, default_value = "host")]
    pub role: Role,

    /// Number of clients to connect
    #[arg(short, long, default_value = "2")]
    pub clients: u32,

    /// Shared network configuration (JSON); built-in defaults when absent
    #[arg(long, env = "NETSYNC_CONFIG")]
    pub network_config: Option<PathBuf>,

    /// Scene to switch to once everyone joined
    #[arg(long, default_value = "Arena")]
    pub target_scene: String,

    /// Maximum poll rounds before giving up
    #[arg(long, default_value = "64")]
    pub ticks: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.clients == 0 {
            anyhow::bail!("At least one client is required");
        }
        if self.ticks == 0 {
            anyhow::bail!("Ticks must be positive");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        Ok(())
    }

    /// Load the shared network configuration
    pub fn load_network_config(&self) -> anyhow::Result<NetworkConfig> {
        let config = match &self.network_config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => demo_network_config(),
        };
        config.validate()?;
        if config.scene_index(&self.target_scene).is_none() {
            anyhow::bail!("Target scene {} is not registered", self.target_scene);
        }
        Ok(config)
    }
}

/// Two scenes, signed encrypted handshake, soft-sync scene objects
pub fn demo_network_config() -> NetworkConfig {
    NetworkConfig {
        enable_encryption: true,
        sign_key_exchange: true,
        registered_scenes: vec!["Lobby".to_string(), "Arena".to_string()],
        network_prefabs: vec!["Player".to_string(), "Crate".to_string()],
        ..NetworkConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("netsyncd").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.role, Role::Host);
        assert_eq!(config.clients, 2);
        config.validate().unwrap();
        let network = config.load_network_config().unwrap();
        assert!(network.sign_key_exchange);
    }

    #[test]
    fn test_validation() {
        assert!(config(&["--clients", "0"]).validate().is_err());
        assert!(config(&["--log-format", "xml"]).validate().is_err());
        assert!(config(&["--target-scene", "Nowhere"]).load_network_config().is_err());
        assert_eq!(config(&["--role", "server"]).role, Role::Server);
    }

    #[test]
    fn test_network_config_from_json() {
        let path = std::env::temp_dir().join(format!("netsyncd-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"registered_scenes": ["Lobby", "Arena"], "use_prefab_sync": true}"#).unwrap();
        let config = config(&["--network-config", path.to_str().unwrap()]);
        let network = config.load_network_config().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(network.use_prefab_sync);
        assert!(!network.enable_encryption);
        assert_eq!(network.registered_scenes.len(), 2);
    }
}
