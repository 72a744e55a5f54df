//! Fitness evaluation.
//!
//! Every genome is scored by the oracle once on the in-sample half and once
//! on the out-of-sample half of the evaluation window. Results are memoized
//! per `(genome_id, window fingerprint)`, oracle calls run under a deadline
//! with a bounded number of retries, and a whole population is evaluated on
//! a dedicated rayon pool before anything downstream looks at it.
//!
//! At most `concurrency_limit` oracle calls run at once. A timed-out call
//! is abandoned but keeps its slot until it actually returns.

use crate::config::EvaluationConfig;
use crate::data::FitnessCache;
use crate::engines::evaluation::oracle::{OracleRequest, ScoringOracle};
use crate::engines::evaluation::splitter::{DataSplitter, DataWindow, SimpleSplitter};
use crate::engines::generation::genome::Individual;
use crate::engines::metrics::{MultiObjectiveMetrics, ObjectiveConfig};
use crate::error::{ForgeError, Result};
use crate::utils::{call_with_timeout, CallLimit, CallOutcome};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Oracle output for one genome on one window.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub in_sample: MultiObjectiveMetrics,
    pub out_of_sample: MultiObjectiveMetrics,
    /// Set when the result carries no discriminating signal.
    pub degenerate: Option<String>,
}

/// Non-fatal evaluation failure. The individual is non-viable for this
/// generation; nothing is cached, so a later generation may try again.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("evaluation of {genome_id} failed: {reason}")]
pub struct EvaluationFailure {
    pub genome_id: String,
    pub reason: String,
}

impl From<EvaluationFailure> for ForgeError {
    fn from(failure: EvaluationFailure) -> Self {
        ForgeError::Evaluation { genome_id: failure.genome_id, reason: failure.reason }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorStats {
    pub cache_hits: usize,
    /// Unique evaluations performed.
    pub cache_misses: usize,
    pub oracle_calls: usize,
    pub failures: usize,
    pub timeouts: usize,
}

/// Counts from one `evaluate_population` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub evaluated: usize,
    pub degenerate: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    oracle_calls: AtomicUsize,
    failures: AtomicUsize,
    timeouts: AtomicUsize,
}

pub struct FitnessEvaluator {
    oracle: Arc<dyn ScoringOracle>,
    splitter: SimpleSplitter,
    cache: Arc<FitnessCache>,
    pool: rayon::ThreadPool,
    limit: Arc<CallLimit>,
    objectives: Vec<ObjectiveConfig>,
    oracle_timeout: Option<Duration>,
    max_retries: usize,
    activity_metric: String,
    counters: Counters,
}

impl FitnessEvaluator {
    pub fn new(
        oracle: Arc<dyn ScoringOracle>,
        config: &EvaluationConfig,
        objectives: Vec<ObjectiveConfig>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency_limit.max(1))
            .thread_name(|i| format!("forge-eval-{}", i))
            .build()
            .map_err(|e| ForgeError::Configuration(format!("Failed to build evaluation pool: {}", e)))?;

        Ok(Self {
            oracle,
            splitter: config.splitter(),
            cache: Arc::new(FitnessCache::new()),
            pool,
            limit: CallLimit::new(config.concurrency_limit),
            objectives,
            oracle_timeout: Some(Duration::from_millis(config.oracle_timeout_ms)),
            max_retries: config.max_retries,
            activity_metric: config.activity_metric.clone(),
            counters: Counters::default(),
        })
    }

    /// Share a cache between evaluators.
    pub fn with_cache(mut self, cache: Arc<FitnessCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<FitnessCache> {
        &self.cache
    }

    pub fn objectives(&self) -> &[ObjectiveConfig] {
        &self.objectives
    }

    pub fn stats(&self) -> EvaluatorStats {
        EvaluatorStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            oracle_calls: self.counters.oracle_calls.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Score one individual on the IS and OOS halves of `window`.
    pub fn evaluate(
        &self,
        individual: &Individual,
        window: &DataWindow,
    ) -> std::result::Result<Evaluation, EvaluationFailure> {
        let genome_id = individual.genome_id();
        let split = self
            .splitter
            .split(window)
            .map_err(|e| self.failure(genome_id, e.to_string()))?;
        let fingerprint = self.splitter.fingerprint(window);

        if let Some(hit) = self.cache.get(genome_id, &fingerprint) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let in_sample = self.call_oracle(individual, &split.in_sample)?;
        let out_of_sample = self.call_oracle(individual, &split.out_of_sample)?;

        for (label, metrics) in [("in-sample", &in_sample), ("out-of-sample", &out_of_sample)] {
            let missing = metrics.missing_objectives(&self.objectives);
            if !missing.is_empty() {
                return Err(self.failure(
                    genome_id,
                    format!("{} output lacks finite {}", label, missing.join(", ")),
                ));
            }
        }

        let evaluation = Evaluation {
            degenerate: self.degenerate_reason(&in_sample),
            in_sample,
            out_of_sample,
        };
        self.cache.set(genome_id.to_string(), fingerprint, evaluation.clone());
        Ok(evaluation)
    }

    /// Score an individual on a whole window without splitting it. Used to
    /// re-validate a probationary champion on fresh data.
    pub fn revalidate(
        &self,
        individual: &Individual,
        window: &DataWindow,
    ) -> std::result::Result<Evaluation, EvaluationFailure> {
        let genome_id = individual.genome_id();
        if window.is_empty() {
            return Err(self.failure(genome_id, format!("empty window {}..={}", window.start, window.end)));
        }
        let fingerprint = format!("whole:{}", self.splitter.fingerprint(window));

        if let Some(hit) = self.cache.get(genome_id, &fingerprint) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let metrics = self.call_oracle(individual, window)?;
        let missing = metrics.missing_objectives(&self.objectives);
        if !missing.is_empty() {
            return Err(self.failure(genome_id, format!("re-validation output lacks finite {}", missing.join(", "))));
        }

        let evaluation = Evaluation {
            degenerate: self.degenerate_reason(&metrics),
            in_sample: metrics.clone(),
            out_of_sample: metrics,
        };
        self.cache.set(genome_id.to_string(), fingerprint, evaluation.clone());
        Ok(evaluation)
    }

    /// Evaluate every pending individual in parallel and write the results
    /// back in place. Returns once all of them are settled.
    pub fn evaluate_population(&self, individuals: &mut [Individual], window: &DataWindow) -> EvaluationReport {
        // One job per distinct genome so a genome is scored at most once per pass
        let mut jobs: Vec<usize> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for (i, ind) in individuals.iter().enumerate() {
            if ind.is_pending() && seen.insert(ind.genome_id()) {
                jobs.push(i);
            }
        }
        drop(seen);

        if jobs.is_empty() {
            return EvaluationReport::default();
        }
        debug!("Evaluating {} distinct pending genomes", jobs.len());

        let shared: &[Individual] = individuals;
        let results: Vec<(String, std::result::Result<Evaluation, EvaluationFailure>)> = self.pool.install(|| {
            jobs.par_iter()
                .map(|&i| (shared[i].genome_id().to_string(), self.evaluate(&shared[i], window)))
                .collect()
        });
        let results: HashMap<String, std::result::Result<Evaluation, EvaluationFailure>> =
            results.into_iter().collect();

        let mut report = EvaluationReport::default();
        for ind in individuals.iter_mut().filter(|i| i.is_pending()) {
            let Some(result) = results.get(ind.genome_id()) else { continue };
            match result {
                Ok(evaluation) => match &evaluation.degenerate {
                    Some(reason) => {
                        warn!("Degenerate individual {}: {}", ind.genome_id(), reason);
                        ind.mark_degenerate(
                            reason.clone(),
                            evaluation.in_sample.clone(),
                            evaluation.out_of_sample.clone(),
                        );
                        report.degenerate += 1;
                    }
                    None => {
                        ind.mark_evaluated(evaluation.in_sample.clone(), evaluation.out_of_sample.clone());
                        report.evaluated += 1;
                    }
                },
                Err(failure) => {
                    warn!("Evaluation failed for {}: {}", failure.genome_id, failure.reason);
                    ind.mark_failed(failure.reason.clone());
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn degenerate_reason(&self, metrics: &MultiObjectiveMetrics) -> Option<String> {
        if let Some(activity) = metrics.get(&self.activity_metric) {
            if activity <= 0.0 {
                return Some(format!("{} = {}", self.activity_metric, activity));
            }
        }
        let values = metrics.objective_vector(&self.objectives)?;
        if !values.is_empty() && values.iter().all(|v| *v == 0.0) {
            return Some("every objective is exactly zero".to_string());
        }
        None
    }

    fn call_oracle(
        &self,
        individual: &Individual,
        window: &DataWindow,
    ) -> std::result::Result<MultiObjectiveMetrics, EvaluationFailure> {
        let request = OracleRequest {
            genome_id: individual.genome_id().to_string(),
            template: individual.template(),
            parameters: individual.parameters().clone(),
            code: individual.code().map(str::to_string),
            start: window.start,
            end: window.end,
        };

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            last_error = match self.limit.acquire(self.oracle_timeout) {
                None => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    format!("no free oracle slot within {:?}", self.oracle_timeout.unwrap_or_default())
                }
                Some(permit) => {
                    self.counters.oracle_calls.fetch_add(1, Ordering::Relaxed);
                    let oracle = Arc::clone(&self.oracle);
                    let req = request.clone();

                    // The slot moves into the worker and is released when the oracle returns
                    let outcome = call_with_timeout(self.oracle_timeout, move || {
                        let _permit = permit;
                        oracle.evaluate(&req)
                    });
                    match outcome {
                        CallOutcome::Completed(Ok(raw)) => return Ok(MultiObjectiveMetrics::from_raw(raw)),
                        CallOutcome::Completed(Err(e)) => e.to_string(),
                        CallOutcome::TimedOut => {
                            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                            format!("oracle timed out after {:?}", self.oracle_timeout.unwrap_or_default())
                        }
                        CallOutcome::Crashed => "oracle worker panicked".to_string(),
                    }
                }
            };

            if attempt < self.max_retries {
                debug!(
                    "Retrying {} on {}..={} after attempt {}: {}",
                    request.genome_id,
                    window.start,
                    window.end,
                    attempt + 1,
                    last_error
                );
            }
        }

        Err(self.failure(individual.genome_id(), last_error))
    }

    fn failure(&self, genome_id: &str, reason: String) -> EvaluationFailure {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        EvaluationFailure { genome_id: genome_id.to_string(), reason }
    }
}
