use super::traits::{check_unit_interval, ConfigSection};
use crate::error::{ForgeError, Result};
use crate::functions::StrategyTemplate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub num_generations: usize,
    pub crossover_rate: f64,
    pub elitism_count: usize,
    pub tournament_size: usize,
    /// Probability that a tournament is decided by novelty instead of rank.
    pub p_diversity: f64,
    pub seed: Option<u64>,
    /// Templates the initial population is drawn from.
    pub templates: Vec<StrategyTemplate>,
    /// Ask the generator for strategy code for every new genome.
    pub code_generation: bool,
    /// Ask the generator to hybridize parent code during crossover.
    pub hybridization: bool,
    pub generator_timeout_ms: u64,
    pub max_code_length: usize,
    /// Attempts to breed a child whose genome is not already in the next generation.
    pub max_duplicate_retries: usize,
    pub mutation: MutationConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 40,
            num_generations: 30,
            crossover_rate: 0.85,
            elitism_count: 4,
            tournament_size: 3,
            p_diversity: 0.2,
            seed: None,
            templates: StrategyTemplate::ALL.to_vec(),
            code_generation: false,
            hybridization: false,
            generator_timeout_ms: 2_000,
            max_code_length: 16 * 1024,
            max_duplicate_retries: 3,
            mutation: MutationConfig::default(),
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(ForgeError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        if self.num_generations == 0 {
            return Err(ForgeError::Configuration(
                "Number of generations must be at least 1".to_string(),
            ));
        }
        if self.elitism_count >= self.population_size {
            return Err(ForgeError::Configuration(format!(
                "Elitism count {} must be smaller than population size {}",
                self.elitism_count, self.population_size
            )));
        }
        if self.tournament_size == 0 {
            return Err(ForgeError::Configuration(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        if self.templates.is_empty() {
            return Err(ForgeError::Configuration(
                "At least one strategy template must be enabled".to_string(),
            ));
        }
        if self.hybridization && !self.code_generation {
            return Err(ForgeError::Configuration(
                "Hybridization requires code generation".to_string(),
            ));
        }
        check_unit_interval("evolution", "crossover_rate", self.crossover_rate)?;
        check_unit_interval("evolution", "p_diversity", self.p_diversity)?;
        self.mutation.validate()
    }
}

/// Mutation strength and the adaptive rate controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub initial_rate: f64,
    /// Gaussian std as a fraction of domain width, before scaling by rate.
    pub sigma_scale: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub diversity_floor: f64,
    pub stagnation_generations: usize,
    pub boost_factor: f64,
    pub improvement_streak: usize,
    pub tighten_factor: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            initial_rate: 0.2,
            sigma_scale: 0.5,
            min_rate: 0.02,
            max_rate: 0.8,
            diversity_floor: 0.25,
            stagnation_generations: 5,
            boost_factor: 1.5,
            improvement_streak: 3,
            tighten_factor: 0.8,
        }
    }
}

impl MutationConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("evolution.mutation", "initial_rate", self.initial_rate)?;
        check_unit_interval("evolution.mutation", "min_rate", self.min_rate)?;
        check_unit_interval("evolution.mutation", "max_rate", self.max_rate)?;
        check_unit_interval("evolution.mutation", "diversity_floor", self.diversity_floor)?;
        if self.min_rate > self.max_rate {
            return Err(ForgeError::Configuration(format!(
                "Mutation min_rate {} exceeds max_rate {}",
                self.min_rate, self.max_rate
            )));
        }
        if self.initial_rate < self.min_rate || self.initial_rate > self.max_rate {
            return Err(ForgeError::Configuration(format!(
                "Initial mutation rate {} must lie in [{}, {}]",
                self.initial_rate, self.min_rate, self.max_rate
            )));
        }
        if !(self.sigma_scale > 0.0) {
            return Err(ForgeError::Configuration(
                "Mutation sigma_scale must be positive".to_string(),
            ));
        }
        if self.boost_factor < 1.0 {
            return Err(ForgeError::Configuration(
                "Mutation boost_factor must be at least 1".to_string(),
            ));
        }
        if !(self.tighten_factor > 0.0 && self.tighten_factor <= 1.0) {
            return Err(ForgeError::Configuration(
                "Mutation tighten_factor must be in (0, 1]".to_string(),
            ));
        }
        if self.stagnation_generations == 0 || self.improvement_streak == 0 {
            return Err(ForgeError::Configuration(
                "Stagnation and improvement windows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_rates() {
        let mut config = EvolutionConfig::default();
        config.crossover_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = EvolutionConfig::default();
        config.mutation.initial_rate = 0.9;
        assert!(config.validate().is_err());

        let mut config = EvolutionConfig::default();
        config.elitism_count = config.population_size;
        assert!(config.validate().is_err());

        let mut config = EvolutionConfig::default();
        config.hybridization = true;
        assert!(config.validate().is_err());
        config.code_generation = true;
        assert!(config.validate().is_ok());
    }
}
