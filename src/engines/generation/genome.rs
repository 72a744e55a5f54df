//! Genome and individual representation.
//!
//! A genome is a strategy template plus a concrete parameter set and,
//! optionally, generated strategy code. Its identity is a content hash, so
//! two individuals that carry the same genome share one `genome_id` and one
//! fitness cache entry.
//!
//! The genome part of an [`Individual`] is fixed at construction; only the
//! evaluation state (status, metrics, rank, crowding, novelty) changes while
//! the individual lives in a population.

use crate::engines::metrics::{MultiObjectiveMetrics, ObjectiveConfig};
use crate::functions::StrategyTemplate;
use crate::types::{EvaluationSample, Parameters};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Rank assigned to individuals that cannot take part in Pareto sorting.
pub const NON_VIABLE_RANK: usize = usize::MAX;

#[derive(Serialize)]
struct GenomeKey<'a> {
    template: &'a StrategyTemplate,
    parameters: &'a Parameters,
    code: Option<&'a str>,
}

/// Content hash of a genome: lowercase hex SHA-256, 64 characters.
pub fn genome_id(template: StrategyTemplate, parameters: &Parameters, code: Option<&str>) -> String {
    let key = GenomeKey { template: &template, parameters, code };
    let canonical = serde_json::to_vec(&key).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Evaluated,
    Failed { reason: String },
    Degenerate { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    genome_id: String,
    template: StrategyTemplate,
    parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    pub status: EvaluationStatus,
    /// In-sample metrics.
    #[serde(default)]
    pub metrics: Option<MultiObjectiveMetrics>,
    #[serde(default)]
    pub oos_metrics: Option<MultiObjectiveMetrics>,
    #[serde(default)]
    pub rank: Option<usize>,
    #[serde(default, with = "crate::utils::serde_float")]
    pub crowding_distance: Option<f64>,
    #[serde(default, with = "crate::utils::serde_float")]
    pub novelty_score: Option<f64>,
    pub generation_born: usize,
}

impl Individual {
    pub fn new(
        template: StrategyTemplate,
        parameters: Parameters,
        code: Option<String>,
        generation_born: usize,
    ) -> Self {
        let genome_id = genome_id(template, &parameters, code.as_deref());
        Self {
            genome_id,
            template,
            parameters,
            code,
            status: EvaluationStatus::Pending,
            metrics: None,
            oos_metrics: None,
            rank: None,
            crowding_distance: None,
            novelty_score: None,
            generation_born,
        }
    }

    pub fn genome_id(&self) -> &str {
        &self.genome_id
    }

    pub fn template(&self) -> StrategyTemplate {
        self.template
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Same parameters with different code. Produces a new genome id.
    pub fn with_code(&self, code: Option<String>, generation_born: usize) -> Self {
        Individual::new(self.template, self.parameters.clone(), code, generation_born)
    }

    /// Recompute the content hash and compare with the stored id.
    pub fn verify_id(&self) -> bool {
        genome_id(self.template, &self.parameters, self.code.as_deref()) == self.genome_id
    }

    pub fn is_pending(&self) -> bool {
        self.status == EvaluationStatus::Pending
    }

    /// Evaluated, non-degenerate, and carrying every configured objective.
    pub fn is_viable(&self, objectives: &[ObjectiveConfig]) -> bool {
        self.status == EvaluationStatus::Evaluated
            && self
                .metrics
                .as_ref()
                .and_then(|m| m.objective_vector(objectives))
                .map(|v| v.iter().all(|x| x.is_finite()))
                .unwrap_or(false)
    }

    pub fn mark_evaluated(&mut self, in_sample: MultiObjectiveMetrics, out_of_sample: MultiObjectiveMetrics) {
        self.status = EvaluationStatus::Evaluated;
        self.metrics = Some(in_sample);
        self.oos_metrics = Some(out_of_sample);
    }

    /// Degenerate individuals keep their metrics for audit.
    pub fn mark_degenerate(
        &mut self,
        reason: String,
        in_sample: MultiObjectiveMetrics,
        out_of_sample: MultiObjectiveMetrics,
    ) {
        self.status = EvaluationStatus::Degenerate { reason };
        self.metrics = Some(in_sample);
        self.oos_metrics = Some(out_of_sample);
    }

    pub fn mark_failed(&mut self, reason: String) {
        self.status = EvaluationStatus::Failed { reason };
        self.metrics = None;
        self.oos_metrics = None;
    }

    /// Clear per-generation annotations before the individual moves on.
    pub fn reset_annotations(&mut self) {
        self.rank = None;
        self.crowding_distance = None;
        self.novelty_score = None;
    }

    /// Metrics for the requested sample, if evaluated.
    pub fn sample_metrics(&self, sample: EvaluationSample) -> Option<&MultiObjectiveMetrics> {
        match sample {
            EvaluationSample::InSample => self.metrics.as_ref(),
            EvaluationSample::OutOfSample => self.oos_metrics.as_ref(),
        }
    }
}
