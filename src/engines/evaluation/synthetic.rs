use crate::engines::evaluation::oracle::{OracleError, OracleRequest, ScoringOracle};
use crate::functions::{ParamDomain, StrategyTemplate};
use crate::types::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Deterministic in-process oracle.
///
/// Each template has a hidden optimum inside its parameter space; the
/// closer a genome sits to it, the better its risk-adjusted return. A small
/// hash-derived term stands in for market noise, so the same genome on the
/// same window always scores the same.
#[derive(Debug, Clone)]
pub struct SyntheticOracle {
    seed: u64,
    noise: f64,
}

impl Default for SyntheticOracle {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SyntheticOracle {
    pub fn new(seed: u64) -> Self {
        Self { seed, noise: 0.15 }
    }

    /// Scale of the hash-derived noise term on sharpe.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Uniform value in [0, 1) derived from `parts`.
    fn unit(&self, parts: &[&str]) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn base_sharpe(template: StrategyTemplate) -> f64 {
        match template {
            StrategyTemplate::MomentumCrossover => 1.1,
            StrategyTemplate::MeanReversion => 1.3,
            StrategyTemplate::Breakout => 0.9,
            StrategyTemplate::MultiFactor => 1.5,
        }
    }

    /// Squared distance from the template's hidden optimum, averaged over
    /// the schema and normalized to [0, 1].
    fn misfit(&self, template: StrategyTemplate, request: &OracleRequest) -> f64 {
        let schema = template.schema();
        if schema.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        for spec in schema {
            let target = self.unit(&[template.name(), spec.name, "target"]);
            let value = request.parameters.get(spec.name);
            let gap = match (spec.domain, value) {
                (ParamDomain::Integer { min, .. }, Some(v)) => numeric_gap(min as f64, spec.domain.width(), v, target),
                (ParamDomain::Float { min, .. }, Some(v)) => numeric_gap(min, spec.domain.width(), v, target),
                (ParamDomain::Categorical(options), Some(Value::Categorical(s))) => {
                    let best = options[(target * options.len() as f64) as usize % options.len()];
                    if best == s.as_str() { 0.0 } else { 0.5 }
                }
                (ParamDomain::Bool, Some(Value::Bool(b))) => {
                    if *b == (target >= 0.5) { 0.0 } else { 0.5 }
                }
                _ => 1.0,
            };
            total += gap;
        }
        (total / schema.len() as f64).min(1.0)
    }
}

fn numeric_gap(min: f64, width: f64, value: &Value, target: f64) -> f64 {
    match value.as_f64() {
        Some(v) if width > 0.0 => ((v - min) / width - target).powi(2),
        _ => 1.0,
    }
}

impl ScoringOracle for SyntheticOracle {
    fn evaluate(&self, request: &OracleRequest) -> Result<BTreeMap<String, f64>, OracleError> {
        let window = request.window();
        let days = window.days();
        if days == 0 {
            return Err(OracleError::NoData { start: request.start, end: request.end });
        }

        let template = request.template;
        let window_key = format!("{}|{}", request.start, request.end);
        let code = request.code.as_deref().unwrap_or("");

        let misfit = self.misfit(template, request);
        let noise = self.unit(&[&request.genome_id, &window_key, "noise"]) - 0.5;
        let code_bonus = if code.is_empty() { 0.0 } else { 0.05 };

        let sharpe = Self::base_sharpe(template) * (1.0 - 2.5 * misfit) + self.noise * noise + code_bonus;
        let drawdown_noise = self.unit(&[&request.genome_id, &window_key, "dd"]);
        let max_drawdown = -(0.05 + 0.25 * misfit + 0.1 * drawdown_noise);
        let turnover = 0.1 + 0.9 * self.unit(&[&request.genome_id, "turnover"]);
        let concentration = 0.2 + 0.6 * self.unit(&[&request.genome_id, "concentration"]);
        let trade_count = ((days as f64 / 5.0) * turnover).round();

        let mut metrics = BTreeMap::new();
        metrics.insert("sharpe".to_string(), sharpe);
        metrics.insert("max_drawdown".to_string(), max_drawdown);
        metrics.insert("turnover".to_string(), turnover);
        metrics.insert("concentration".to_string(), concentration);
        metrics.insert("trade_count".to_string(), trade_count);
        Ok(metrics)
    }
}
