//! Champion tracking with anti-churn protection.
//!
//! The tracker holds at most one champion and moves through
//! `NoChampion -> Probation -> Established`. A fresh champion must survive a
//! probation period and a re-validation on fresh data before it is
//! established; an established champion is only replaced by a challenger
//! that is clearly better, behaves similarly and is not a near-duplicate.
//! Every retired champion is appended to an immutable history.

use crate::config::ChampionConfig;
use crate::engines::generation::genome::Individual;
use crate::engines::metrics::{MultiObjectiveMetrics, ObjectiveConfig};
use crate::error::{ForgeError, Result};
use crate::functions::StrategyTemplate;
use crate::types::{EvaluationSample, Parameters};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChampionState {
    NoChampion,
    Probation,
    Established,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionRecord {
    pub genome_id: String,
    pub template: StrategyTemplate,
    pub parameters: Parameters,
    #[serde(default)]
    pub code: Option<String>,
    pub metrics: MultiObjectiveMetrics,
    pub oos_metrics: MultiObjectiveMetrics,
    #[serde(default, with = "crate::utils::serde_float")]
    pub novelty_score: Option<f64>,
    /// Generation the record was installed in.
    pub generation: usize,
    pub promoted_at: DateTime<Utc>,
    #[serde(default)]
    pub probation_until: Option<usize>,
}

impl ChampionRecord {
    /// Record for an evaluated individual; `None` if it carries no metrics.
    pub fn from_individual(individual: &Individual, generation: usize) -> Option<Self> {
        Some(Self {
            genome_id: individual.genome_id().to_string(),
            template: individual.template(),
            parameters: individual.parameters().clone(),
            code: individual.code().map(str::to_string),
            metrics: individual.metrics.clone()?,
            oos_metrics: individual.oos_metrics.clone()?,
            novelty_score: individual.novelty_score,
            generation,
            promoted_at: Utc::now(),
            probation_until: None,
        })
    }

    /// Fresh individual carrying the champion's genome.
    pub fn to_individual(&self) -> Individual {
        Individual::new(self.template, self.parameters.clone(), self.code.clone(), self.generation)
    }

    pub fn sample_metrics(&self, sample: EvaluationSample) -> &MultiObjectiveMetrics {
        match sample {
            EvaluationSample::InSample => &self.metrics,
            EvaluationSample::OutOfSample => &self.oos_metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetirementReason {
    FailedProbation,
    Replaced { by: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionHistoryEntry {
    pub record: ChampionRecord,
    pub retired_generation: usize,
    pub reason: RetirementReason,
}

/// What one call to [`ChampionTracker::observe`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChampionDecision {
    /// A champion was installed from `NoChampion`.
    Promoted { genome_id: String },
    /// The probationary champion passed re-validation.
    Confirmed { genome_id: String },
    /// The probationary champion failed; `successor` went on probation in
    /// its place, if any candidate qualified.
    Revoked { genome_id: String, successor: Option<String> },
    /// An established champion was replaced.
    Replaced { previous: String, genome_id: String },
    /// The current champion stays.
    Retained,
    /// No champion and nobody qualifies.
    NoCandidate,
}

/// Persisted champion document: state, current record and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionDocument {
    pub state: ChampionState,
    pub champion: Option<ChampionRecord>,
    pub history: Vec<ChampionHistoryEntry>,
}

pub struct ChampionTracker {
    config: ChampionConfig,
    objectives: Vec<ObjectiveConfig>,
    state: ChampionState,
    champion: Option<ChampionRecord>,
    history: Vec<ChampionHistoryEntry>,
}

impl ChampionTracker {
    pub fn new(config: ChampionConfig, objectives: Vec<ObjectiveConfig>) -> Self {
        Self {
            config,
            objectives,
            state: ChampionState::NoChampion,
            champion: None,
            history: Vec::new(),
        }
    }

    /// Rebuild a tracker from persisted state.
    pub fn restore(
        config: ChampionConfig,
        objectives: Vec<ObjectiveConfig>,
        document: ChampionDocument,
    ) -> Result<Self> {
        let consistent = match document.state {
            ChampionState::NoChampion => document.champion.is_none(),
            ChampionState::Probation => document
                .champion
                .as_ref()
                .map(|c| c.probation_until.is_some())
                .unwrap_or(false),
            ChampionState::Established => document.champion.is_some(),
        };
        if !consistent {
            return Err(ForgeError::Validation(format!(
                "champion state {:?} does not match the stored record",
                document.state
            )));
        }
        Ok(Self {
            config,
            objectives,
            state: document.state,
            champion: document.champion,
            history: document.history,
        })
    }

    pub fn state(&self) -> ChampionState {
        self.state
    }

    pub fn champion(&self) -> Option<&ChampionRecord> {
        self.champion.as_ref()
    }

    pub fn history(&self) -> &[ChampionHistoryEntry] {
        &self.history
    }

    pub fn document(&self) -> ChampionDocument {
        ChampionDocument {
            state: self.state,
            champion: self.champion.clone(),
            history: self.history.clone(),
        }
    }

    /// Inspect one ranked generation.
    ///
    /// `revalidate` scores the probationary champion on fresh data; it is
    /// only called when probation ends this generation.
    pub fn observe<F>(&mut self, generation: usize, individuals: &[Individual], mut revalidate: F) -> ChampionDecision
    where
        F: FnMut(&ChampionRecord) -> Result<MultiObjectiveMetrics>,
    {
        match self.state {
            ChampionState::NoChampion => self.try_promote(generation, individuals, None),
            ChampionState::Probation => self.check_probation(generation, individuals, &mut revalidate),
            ChampionState::Established => self.try_replace(generation, individuals),
        }
    }

    /// Direction-aware primary value on the comparison sample.
    fn primary(&self, metrics: &MultiObjectiveMetrics) -> Option<f64> {
        metrics.primary_score(&self.objectives)
    }

    fn clears_bar(&self, metrics: &MultiObjectiveMetrics) -> bool {
        self.primary(metrics).map(|p| p > self.config.min_primary).unwrap_or(false)
    }

    /// Front-0 viable individuals clearing the bar, best primary first.
    fn candidates<'a>(&self, individuals: &'a [Individual], exclude: Option<&str>) -> Vec<(&'a Individual, f64)> {
        let sample = self.config.comparison_sample;
        let mut candidates: Vec<(&Individual, f64)> = individuals
            .iter()
            .filter(|i| i.rank == Some(0) && i.is_viable(&self.objectives))
            .filter(|i| Some(i.genome_id()) != exclude)
            .filter_map(|i| {
                let score = self.primary(i.sample_metrics(sample)?)?;
                (score > self.config.min_primary).then_some((i, score))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.genome_id().cmp(b.0.genome_id())));
        candidates.dedup_by(|a, b| a.0.genome_id() == b.0.genome_id());
        candidates
    }

    fn try_promote(&mut self, generation: usize, individuals: &[Individual], exclude: Option<&str>) -> ChampionDecision {
        let Some((best, score)) = self.candidates(individuals, exclude).into_iter().next() else {
            return ChampionDecision::NoCandidate;
        };
        let Some(mut record) = ChampionRecord::from_individual(best, generation) else {
            return ChampionDecision::NoCandidate;
        };

        let until = generation + self.config.probation_length;
        record.probation_until = Some(until);
        info!(
            "Generation {}: promoted {} ({}) to probation until generation {}, primary {:.4}",
            generation,
            record.genome_id,
            record.template.name(),
            until,
            score
        );

        let genome_id = record.genome_id.clone();
        self.champion = Some(record);
        self.state = ChampionState::Probation;
        ChampionDecision::Promoted { genome_id }
    }

    fn check_probation<F>(&mut self, generation: usize, individuals: &[Individual], revalidate: &mut F) -> ChampionDecision
    where
        F: FnMut(&ChampionRecord) -> Result<MultiObjectiveMetrics>,
    {
        let Some(champion) = self.champion.as_ref() else {
            self.state = ChampionState::NoChampion;
            return self.try_promote(generation, individuals, None);
        };
        let until = champion.probation_until.unwrap_or(generation);
        if generation < until {
            return ChampionDecision::Retained;
        }

        let verdict = match revalidate(champion) {
            Ok(metrics) if self.clears_bar(&metrics) => Ok(()),
            Ok(metrics) => Err(format!(
                "re-validation primary {:?} does not exceed {}",
                self.primary(&metrics),
                self.config.min_primary
            )),
            Err(e) => Err(e.to_string()),
        };

        match verdict {
            Ok(()) => {
                let genome_id = champion.genome_id.clone();
                if let Some(c) = self.champion.as_mut() {
                    c.probation_until = None;
                }
                self.state = ChampionState::Established;
                info!("Generation {}: champion {} confirmed after probation", generation, genome_id);
                ChampionDecision::Confirmed { genome_id }
            }
            Err(reason) => {
                let failed = champion.genome_id.clone();
                warn!("Generation {}: champion {} failed probation: {}", generation, failed, reason);
                self.retire(generation, RetirementReason::FailedProbation);
                self.state = ChampionState::NoChampion;

                let successor = match self.try_promote(generation, individuals, Some(&failed)) {
                    ChampionDecision::Promoted { genome_id } => Some(genome_id),
                    _ => None,
                };
                ChampionDecision::Revoked { genome_id: failed, successor }
            }
        }
    }

    fn try_replace(&mut self, generation: usize, individuals: &[Individual]) -> ChampionDecision {
        let Some(champion) = self.champion.as_ref() else {
            self.state = ChampionState::NoChampion;
            return self.try_promote(generation, individuals, None);
        };
        let sample = self.config.comparison_sample;
        let champion_metrics = champion.sample_metrics(sample);
        let Some(champion_score) = self.primary(champion_metrics) else {
            return ChampionDecision::Retained;
        };
        let threshold = champion_score + self.config.replacement_margin * champion_score.abs();

        let challenger = self
            .candidates(individuals, Some(&champion.genome_id))
            .into_iter()
            .take_while(|(_, score)| *score > threshold)
            .find(|(candidate, _)| {
                let Some(metrics) = candidate.sample_metrics(sample) else { return false };
                self.behavior_compatible(champion_metrics, metrics)
                    && candidate.novelty_score.map(|n| n >= self.config.min_novelty).unwrap_or(false)
            });

        let Some((winner, score)) = challenger else {
            return ChampionDecision::Retained;
        };
        let Some(record) = ChampionRecord::from_individual(winner, generation) else {
            return ChampionDecision::Retained;
        };

        let previous = champion.genome_id.clone();
        info!(
            "Generation {}: {} replaces champion {} (primary {:.4} vs {:.4})",
            generation, record.genome_id, previous, score, champion_score
        );
        self.retire(generation, RetirementReason::Replaced { by: record.genome_id.clone() });
        let genome_id = record.genome_id.clone();
        self.champion = Some(record);
        self.state = ChampionState::Established;
        ChampionDecision::Replaced { previous, genome_id }
    }

    /// Every behavioral metric the champion has must be present on the
    /// challenger and within the relative tolerance band.
    fn behavior_compatible(&self, champion: &MultiObjectiveMetrics, challenger: &MultiObjectiveMetrics) -> bool {
        self.config.behavioral_metrics.iter().all(|name| match champion.get(name) {
            None => true,
            Some(p) => match challenger.get(name) {
                Some(c) => (c - p).abs() <= self.config.behavior_tolerance * p.abs().max(1e-9),
                None => false,
            },
        })
    }

    /// Move the current champion into history.
    fn retire(&mut self, generation: usize, reason: RetirementReason) {
        if let Some(record) = self.champion.take() {
            self.history.push(ChampionHistoryEntry {
                record,
                retired_generation: generation,
                reason,
            });
        }
    }
}
