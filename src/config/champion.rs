use super::traits::ConfigSection;
use crate::error::{ForgeError, Result};
use crate::types::EvaluationSample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChampionConfig {
    /// Direction-aware primary objective a candidate must strictly exceed.
    pub min_primary: f64,
    /// Generations a new champion spends on probation.
    pub probation_length: usize,
    /// Relative primary-objective margin a challenger must beat.
    pub replacement_margin: f64,
    /// Metrics whose profile a challenger must stay close to.
    pub behavioral_metrics: Vec<String>,
    /// Relative band around the champion's behavioral metrics.
    pub behavior_tolerance: f64,
    pub min_novelty: f64,
    /// Which sample champion comparisons are made on.
    pub comparison_sample: EvaluationSample,
}

impl Default for ChampionConfig {
    fn default() -> Self {
        Self {
            min_primary: 0.0,
            probation_length: 3,
            replacement_margin: 0.05,
            behavioral_metrics: vec!["turnover".to_string(), "concentration".to_string()],
            behavior_tolerance: 0.5,
            min_novelty: 0.05,
            comparison_sample: EvaluationSample::OutOfSample,
        }
    }
}

impl ConfigSection for ChampionConfig {
    fn section_name() -> &'static str {
        "champion"
    }

    fn validate(&self) -> Result<()> {
        if !self.min_primary.is_finite() {
            return Err(ForgeError::Configuration(
                "Champion min_primary must be finite".to_string(),
            ));
        }
        if !(self.replacement_margin >= 0.0) {
            return Err(ForgeError::Configuration(
                "Champion replacement margin must be non-negative".to_string(),
            ));
        }
        if !(self.behavior_tolerance >= 0.0) {
            return Err(ForgeError::Configuration(
                "Champion behavior tolerance must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_novelty) {
            return Err(ForgeError::Configuration(
                "Champion min_novelty must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}
