use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::combat::log::DEFAULT_LOG_CAPACITY;

const DEFAULT_REACTION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_AUTO_ADVANCE_DELAY_MS: u64 = 1_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// How long a threatened entity has to decide on a reaction.
    pub reaction_timeout_ms: u64,
    /// Pause before the turn of a downed entity passes on its own. Zero
    /// advances immediately, inside the call that started the turn.
    pub auto_advance_delay_ms: u64,
    pub log_capacity: usize,
    /// Fixed RNG seed for reproducible encounters.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reaction_timeout_ms: DEFAULT_REACTION_TIMEOUT_MS,
            auto_advance_delay_ms: DEFAULT_AUTO_ADVANCE_DELAY_MS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_millis(self.reaction_timeout_ms)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_delay_ms)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse engine config YAML")
    }

    /// Load from `.json`, anything else is read as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse engine config JSON: {}", path.display()))
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse engine config YAML: {}", path.display()))
        }
    }
}
