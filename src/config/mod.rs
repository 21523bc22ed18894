// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let ext = path.extension().and_then(|s| s.to_str());
    let config: Config = if ext == Some("yaml") || ext == Some("yml") {
        serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(&contents).context("Failed to parse JSON config")?
    };

    config.validate()?;
    Ok(config)
}

/// Load the persisted strategy selection; a missing file falls back to round
/// robin without creating it.
pub async fn load_strategy<P: AsRef<Path>>(path: P) -> Result<Strategy> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let selection: StrategySelection = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse strategy file {}", path.display()))?;
            Ok(selection.strategy)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Strategy::default()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read strategy file {}", path.display()))
        }
    }
}

/// Rewrite the strategy file; called on every strategy change.
pub async fn save_strategy<P: AsRef<Path>>(path: P, strategy: Strategy) -> Result<()> {
    let path = path.as_ref();
    let contents = serde_json::to_string_pretty(&StrategySelection { strategy })?;
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write strategy file {}", path.display()))
}
