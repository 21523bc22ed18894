// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_strategy_file")]
    pub strategy_file: PathBuf,

    pub program: ProgramConfig,

    /// Ordered list of backends; position is the least-connections tie-break order.
    pub backends: Vec<BackendConfig>,
}

/// The backend program the process manager builds and spawns.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgramConfig {
    pub binary: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    /// Invoked once when `binary` does not exist yet, e.g. ["cargo", "build", "--bin", "backend"].
    #[serde(default)]
    pub build_command: Vec<String>,

    pub build_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RoundRobin,
    LeastConnections,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::LeastConnections => "least_connections",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::RoundRobin
    }
}

/// On-disk shape of the persisted strategy selection, and the body of
/// `POST /strategy`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategySelection {
    pub strategy: Strategy,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("no backends configured");
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                bail!("backend with empty name");
            }
            if !names.insert(backend.name.as_str()) {
                bail!("duplicate backend name '{}'", backend.name);
            }
            if !ports.insert(backend.port) {
                bail!("duplicate backend port {}", backend.port);
            }
        }

        if self.program.binary.as_os_str().is_empty() {
            bail!("program.binary must be set");
        }

        Ok(())
    }
}

fn default_listen_port() -> u16 {
    8080
}

fn default_strategy_file() -> PathBuf {
    PathBuf::from("strategy.json")
}
