use super::traits::ConfigSection;
use crate::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Continue from `checkpoint.json` in `directory` when it exists.
    pub resume: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("forge_state"),
            resume: true,
        }
    }
}

impl ConfigSection for CheckpointConfig {
    fn section_name() -> &'static str {
        "checkpoint"
    }

    fn validate(&self) -> Result<()> {
        if self.enabled && self.directory.as_os_str().is_empty() {
            return Err(ForgeError::Configuration(
                "Checkpoint directory must be set when checkpointing is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
