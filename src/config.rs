//! Configuration for a simulation run

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agents::AgentConfig;
use crate::graph::WorldGraph;
use crate::log::DEFAULT_RETENTION;
use crate::scheduler::SchedulerSettings;
use crate::world::WorldParams;

/// Main configuration for a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_seed")]
    pub random_seed: u64,
    /// Map file; the built-in Karachi map when omitted.
    #[serde(default)]
    pub map: Option<PathBuf>,
    #[serde(default = "default_retention")]
    pub message_retention: usize,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub world: WorldParams,
    #[serde(default)]
    pub agents: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_name() -> String {
    "karachi".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Run a cycle on this interval while serving; manual stepping only when unset.
    #[serde(default)]
    pub autoplay_ms: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            autoplay_ms: None,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::karachi()
    }
}

impl SimConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("invalid simulation config")
    }

    /// Load configuration from YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save configuration to YAML file
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("failed to serialise config")?;
        fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Karachi map, baseline parameters, seed 42
    pub fn karachi() -> Self {
        Self {
            name: default_name(),
            random_seed: default_seed(),
            map: None,
            message_retention: default_retention(),
            scheduler: SchedulerSettings::default(),
            world: WorldParams::default(),
            agents: AgentConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn load_graph(&self) -> Result<WorldGraph> {
        match &self.map {
            Some(path) => WorldGraph::from_path(path)
                .with_context(|| format!("Failed to load map {}", path.display())),
            None => WorldGraph::karachi().context("built-in map is invalid"),
        }
    }
}

/// Resolves config files relative to a base directory.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<SimConfig> {
        let path = self.base_dir.join(file);
        let mut config = SimConfig::from_yaml(&path)?;
        if let Some(map) = config.map.take() {
            config.map = Some(if map.is_relative() {
                self.base_dir.join(map)
            } else {
                map
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn karachi_preset() {
        let config = SimConfig::karachi();
        assert_eq!(config.name, "karachi");
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.message_retention, 500);
        assert_eq!(config.scheduler.prune_interval, 10);
        assert_eq!(config.agents.alert_threshold, 0.5);
        assert!(config.map.is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = SimConfig::from_yaml_str("random_seed: 9\nworld:\n  victim_rate: 0.02\n")
            .unwrap();
        assert_eq!(config.random_seed, 9);
        assert_eq!(config.world.victim_rate, 0.02);
        assert_eq!(config.world.seismic_decay, 0.05);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.yaml");
        let mut config = SimConfig::karachi();
        config.random_seed = 1234;
        config.server.autoplay_ms = Some(250);
        config.to_yaml(&path).unwrap();

        let loaded = SimConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn loader_resolves_map_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sim.yaml"), "map: maps/city.yaml\n").unwrap();
        let config = ConfigLoader::new(dir.path()).load("sim.yaml").unwrap();
        assert_eq!(config.map, Some(dir.path().join("maps/city.yaml")));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ConfigLoader::new("/nonexistent").load("nope.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("nope.yaml"));
    }
}
