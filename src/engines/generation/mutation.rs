use crate::config::MutationConfig;
use crate::engines::generation::crossover::Offspring;
use crate::engines::generation::genome::Individual;
use crate::functions::ParamDomain;
use crate::types::Value;
use log::info;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Gaussian parameter mutation.
#[derive(Debug, Clone, Copy)]
pub struct Mutator {
    sigma_scale: f64,
}

impl Mutator {
    pub fn new(sigma_scale: f64) -> Self {
        Self { sigma_scale }
    }

    /// Perturb `offspring` in place and return whether any parameter changed.
    ///
    /// Numeric parameters get Gaussian noise with std
    /// `rate * sigma_scale * domain_width`; categorical and boolean ones are
    /// resampled with probability `rate`. Everything is clamped back into
    /// its domain. A changed genome loses its code.
    pub fn mutate<R: Rng>(&self, offspring: &mut Offspring, rate: f64, rng: &mut R) -> bool {
        let rate = rate.clamp(0.0, 1.0);
        let mut changed = false;

        for spec in offspring.template.schema() {
            let current = offspring
                .parameters
                .get(spec.name)
                .cloned()
                .unwrap_or_else(|| spec.domain.midpoint());

            let proposed = match spec.domain {
                ParamDomain::Integer { .. } | ParamDomain::Float { .. } => {
                    let std = rate * self.sigma_scale * spec.domain.width();
                    match (current.as_f64(), Normal::new(0.0, std)) {
                        (Some(x), Ok(normal)) if std > 0.0 => {
                            let shifted = x + normal.sample(rng);
                            spec.domain.clamp(&Value::Float(shifted))
                        }
                        _ => spec.domain.clamp(&current),
                    }
                }
                ParamDomain::Categorical(_) | ParamDomain::Bool => {
                    if rng.gen::<f64>() < rate {
                        spec.domain.sample(rng)
                    } else {
                        spec.domain.clamp(&current)
                    }
                }
            };

            if offspring.parameters.get(spec.name) != Some(&proposed) {
                changed = true;
            }
            offspring.parameters.insert(spec.name.to_string(), proposed);
        }

        let template = offspring.template;
        offspring.parameters.retain(|name, _| template.spec(name).is_some());

        if changed {
            offspring.code = None;
        }
        changed
    }

    /// Mutated copy of `individual`, born in `generation`.
    pub fn mutate_individual<R: Rng>(
        &self,
        individual: &Individual,
        rate: f64,
        generation: usize,
        rng: &mut R,
    ) -> Individual {
        let mut offspring = Offspring::from_parent(individual, true);
        self.mutate(&mut offspring, rate, rng);
        offspring.into_individual(generation)
    }
}

/// Checkpointed state of [`AdaptiveMutation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationState {
    pub rate: f64,
    pub low_diversity_streak: usize,
    pub improvement_run: usize,
    #[serde(default, with = "crate::utils::serde_float")]
    pub last_best_primary: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateAdjustment {
    Unchanged,
    Boosted { from: f64, to: f64 },
    Tightened { from: f64, to: f64 },
}

/// Population-adaptive mutation rate.
///
/// Sustained low diversity boosts the rate (exploration); a sustained run
/// of strict improvements of the best primary objective tightens it
/// (exploitation).
#[derive(Debug, Clone)]
pub struct AdaptiveMutation {
    config: MutationConfig,
    state: MutationState,
}

impl AdaptiveMutation {
    pub fn new(config: MutationConfig) -> Self {
        let state = MutationState {
            rate: config.initial_rate,
            low_diversity_streak: 0,
            improvement_run: 0,
            last_best_primary: None,
        };
        Self { config, state }
    }

    pub fn from_state(config: MutationConfig, state: MutationState) -> Self {
        Self { config, state }
    }

    pub fn rate(&self) -> f64 {
        self.state.rate
    }

    pub fn state(&self) -> &MutationState {
        &self.state
    }

    /// Feed one generation's population diversity and best primary
    /// objective value. The returned adjustment applies to the next
    /// generation's breeding.
    pub fn observe(&mut self, diversity: f64, best_primary: Option<f64>) -> RateAdjustment {
        let mut adjustment = RateAdjustment::Unchanged;

        if diversity < self.config.diversity_floor {
            self.state.low_diversity_streak += 1;
        } else {
            self.state.low_diversity_streak = 0;
        }

        if self.state.low_diversity_streak >= self.config.stagnation_generations {
            let from = self.state.rate;
            let to = (from * self.config.boost_factor).min(self.config.max_rate);
            self.state.rate = to;
            self.state.low_diversity_streak = 0;
            info!(
                "Diversity below {:.3} for {} generations, mutation rate {:.4} -> {:.4}",
                self.config.diversity_floor, self.config.stagnation_generations, from, to
            );
            adjustment = RateAdjustment::Boosted { from, to };
        }

        match (best_primary, self.state.last_best_primary) {
            (Some(now), Some(before)) if now > before => self.state.improvement_run += 1,
            _ => self.state.improvement_run = 0,
        }
        if best_primary.is_some() {
            self.state.last_best_primary = best_primary;
        }

        if self.state.improvement_run >= self.config.improvement_streak
            && adjustment == RateAdjustment::Unchanged
        {
            let from = self.state.rate;
            let to = (from * self.config.tighten_factor).max(self.config.min_rate);
            self.state.rate = to;
            self.state.improvement_run = 0;
            info!(
                "Best objective improved {} generations running, mutation rate {:.4} -> {:.4}",
                self.config.improvement_streak, from, to
            );
            adjustment = RateAdjustment::Tightened { from, to };
        }

        adjustment
    }
}
