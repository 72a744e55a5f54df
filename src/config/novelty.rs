use super::traits::ConfigSection;
use crate::engines::generation::novelty::NoveltyWeights;
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltyConfig {
    pub weights: NoveltyWeights,
    /// Include the template baselines in every reference corpus.
    pub include_template_baselines: bool,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            weights: NoveltyWeights::default(),
            include_template_baselines: true,
        }
    }
}

impl ConfigSection for NoveltyConfig {
    fn section_name() -> &'static str {
        "novelty"
    }

    fn validate(&self) -> Result<()> {
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut config = NoveltyConfig::default();
        assert!(config.validate().is_ok());
        config.weights.logic = 0.5;
        assert!(config.validate().is_err());
    }
}
