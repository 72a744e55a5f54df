use super::{
    champion::ChampionConfig,
    checkpoint::CheckpointConfig,
    evaluation::EvaluationConfig,
    evolution::EvolutionConfig,
    novelty::NoveltyConfig,
    traits::ConfigSection,
};
use crate::engines::metrics::{default_objectives, ObjectiveConfig};
use crate::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment variables that override file settings, e.g.
/// `FORGE__EVOLUTION__POPULATION_SIZE=80`.
pub const ENV_PREFIX: &str = "FORGE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub evolution: EvolutionConfig,
    pub evaluation: EvaluationConfig,
    pub novelty: NoveltyConfig,
    pub champion: ChampionConfig,
    pub checkpoint: CheckpointConfig,
    /// Objectives in priority order; the first is the primary objective.
    pub objectives: Vec<ObjectiveConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            evolution: EvolutionConfig::default(),
            evaluation: EvaluationConfig::default(),
            novelty: NoveltyConfig::default(),
            champion: ChampionConfig::default(),
            checkpoint: CheckpointConfig::default(),
            objectives: default_objectives(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.evolution.validate()?;
        self.evaluation.validate()?;
        self.novelty.validate()?;
        self.champion.validate()?;
        self.checkpoint.validate()?;

        if self.objectives.is_empty() {
            return Err(ForgeError::Configuration(
                "At least one objective must be configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for objective in &self.objectives {
            if !seen.insert(objective.metric_name.as_str()) {
                return Err(ForgeError::Configuration(format!(
                    "Objective {} is configured twice",
                    objective.metric_name
                )));
            }
        }
        Ok(())
    }

    /// Section names in file order.
    pub fn section_names() -> [&'static str; 5] {
        [
            EvolutionConfig::section_name(),
            EvaluationConfig::section_name(),
            NoveltyConfig::section_name(),
            ChampionConfig::section_name(),
            CheckpointConfig::section_name(),
        ]
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load a TOML or JSON file (by extension), apply `FORGE__` environment
    /// overrides, validate, and install the result.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        *self.write() = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| ForgeError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| ForgeError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply `f` and keep the result only if it validates.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.get();
        f(&mut candidate);
        candidate.validate()?;
        *self.write() = candidate;
        Ok(())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AppConfig> {
        self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
