use crate::engines::generation::genome::Individual;
use crate::error::{ForgeError, Result};
use crate::functions::factors::{self, DOMAIN_COUNT};
use crate::functions::StrategyTemplate;
use crate::types::{Parameters, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Operators that make a factor combination non-linear when they appear in code.
const NONLINEAR_OPERATORS: &[&str] = &["rank(", "log(", "sqrt(", "exp(", "tanh(", "zscore(", "pow(", "sign("];

/// Combiner parameter values that are non-linear.
const NONLINEAR_COMBINERS: &[&str] = &["rank_product"];

/// Weights of the three novelty layers. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoveltyWeights {
    pub factor: f64,
    pub combination: f64,
    pub logic: f64,
}

impl Default for NoveltyWeights {
    fn default() -> Self {
        Self { factor: 0.30, combination: 0.40, logic: 0.30 }
    }
}

impl NoveltyWeights {
    /// Build validated weights. A layer is disabled by giving it weight 0.
    pub fn new(factor: f64, combination: f64, logic: f64) -> Result<Self> {
        let weights = Self { factor, combination, logic };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.factor, self.combination, self.logic];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ForgeError::Configuration(format!(
                "Novelty weights must be finite and non-negative, got {:?}",
                parts
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ForgeError::Configuration(format!(
                "Novelty weights must sum to 1.0, got {:.8}",
                sum
            )));
        }
        Ok(())
    }
}

/// How a genome combines its factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationProfile {
    pub domain_count: usize,
    pub nonlinear: bool,
    pub custom_weighting: bool,
}

/// Structural complexity proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexityProfile {
    pub variable_count: usize,
    pub nesting_depth: usize,
    pub filter_chain: usize,
}

impl ComplexityProfile {
    fn dims(&self) -> [f64; 3] {
        [
            self.variable_count as f64,
            self.nesting_depth as f64,
            self.filter_chain as f64,
        ]
    }
}

/// Everything the analyzer needs to know about one genome.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeFeatures {
    pub factors: BTreeSet<String>,
    pub combination: CombinationProfile,
    pub complexity: ComplexityProfile,
}

impl GenomeFeatures {
    pub fn extract(individual: &Individual) -> Self {
        Self::from_genome(individual.template(), individual.parameters(), individual.code())
    }

    pub fn from_genome(template: StrategyTemplate, parameters: &Parameters, code: Option<&str>) -> Self {
        let mut factor_set: BTreeSet<String> =
            template.base_factors().iter().map(|f| f.to_string()).collect();

        let mut filter_flags = 0;
        for spec in template.schema() {
            let Some(value) = parameters.get(spec.name) else { continue };
            match value {
                Value::Categorical(name) if factors::is_factor(name) => {
                    factor_set.insert(name.clone());
                }
                Value::Bool(true) => {
                    filter_flags += 1;
                    if let Some(f) = spec.factor {
                        factor_set.insert(f.to_string());
                    }
                }
                Value::Float(_) | Value::Integer(_) => {
                    if let (Some(f), Some(v)) = (spec.factor, value.as_f64()) {
                        if v > 0.05 {
                            factor_set.insert(f.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        let code_filters = code.map(count_filters).unwrap_or(0);
        if let Some(code) = code {
            factor_set.extend(factors::factors_in_code(code));
        }

        let domains: BTreeSet<_> = factor_set.iter().filter_map(|f| factors::domain_of(f)).collect();

        let nonlinear = template.nonlinear()
            || parameters
                .values()
                .filter_map(Value::as_str)
                .any(|s| NONLINEAR_COMBINERS.contains(&s))
            || code.map(|c| NONLINEAR_OPERATORS.iter().any(|op| c.contains(op))).unwrap_or(false);

        let custom_weighting = has_custom_weights(parameters)
            || code.map(|c| c.contains("weight")).unwrap_or(false);

        let code_vars = code.map(count_assignments).unwrap_or(0);
        let code_depth = code.map(conditional_depth).unwrap_or(0);

        Self {
            factors: factor_set,
            combination: CombinationProfile {
                domain_count: domains.len(),
                nonlinear,
                custom_weighting,
            },
            complexity: ComplexityProfile {
                variable_count: parameters.len().max(code_vars),
                nesting_depth: template.base_nesting().max(code_depth),
                filter_chain: filter_flags.max(code_filters),
            },
        }
    }
}

/// Weights present and not all equal.
fn has_custom_weights(parameters: &Parameters) -> bool {
    let weights: Vec<f64> = parameters
        .iter()
        .filter(|(k, _)| k.ends_with("_weight"))
        .filter_map(|(_, v)| v.as_f64())
        .collect();
    match weights.first() {
        Some(first) => weights.iter().any(|w| (w - first).abs() > 1e-9),
        None => false,
    }
}

fn count_assignments(code: &str) -> usize {
    code.lines().filter(|l| l.contains(" = ")).count()
}

fn count_filters(code: &str) -> usize {
    code.matches("filter").count()
}

/// Deepest brace level at which an `if` opens.
fn conditional_depth(code: &str) -> usize {
    let mut depth = 0usize;
    let mut max_if = 0usize;
    for line in code.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("if ") || trimmed.starts_with("} else if ") || trimmed.starts_with("else if ") {
            max_if = max_if.max(depth + 1);
        }
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    max_if
}

/// |A ∩ B| / |A ∪ B|; two empty sets are identical.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoveltyBreakdown {
    pub factor: f64,
    pub combination: f64,
    pub logic: f64,
    pub total: f64,
}

/// Three-layer weighted novelty scoring.
pub struct NoveltyAnalyzer {
    weights: NoveltyWeights,
    baselines: Vec<GenomeFeatures>,
}

impl NoveltyAnalyzer {
    /// Analyzer whose reference corpus always includes the template baselines.
    pub fn new(weights: NoveltyWeights) -> Self {
        let baselines = StrategyTemplate::ALL
            .iter()
            .map(|t| GenomeFeatures::from_genome(*t, &t.baseline_parameters(), None))
            .collect();
        Self { weights, baselines }
    }

    /// Analyzer that only compares against what it is given.
    pub fn without_baselines(weights: NoveltyWeights) -> Self {
        Self { weights, baselines: Vec::new() }
    }

    pub fn weights(&self) -> &NoveltyWeights {
        &self.weights
    }

    /// Novelty of `individual` against `reference_set` (plus baselines).
    pub fn score(&self, individual: &Individual, reference_set: &[&Individual]) -> f64 {
        let features = GenomeFeatures::extract(individual);
        let mut corpus: Vec<&GenomeFeatures> = self.baselines.iter().collect();
        let reference: Vec<GenomeFeatures> = reference_set.iter().map(|i| GenomeFeatures::extract(i)).collect();
        corpus.extend(reference.iter());
        self.score_features(&features, &corpus).total
    }

    pub fn score_features(&self, features: &GenomeFeatures, corpus: &[&GenomeFeatures]) -> NoveltyBreakdown {
        if corpus.is_empty() {
            return NoveltyBreakdown { factor: 1.0, combination: 1.0, logic: 1.0, total: 1.0 };
        }

        let n = corpus.len() as f64;

        let mean_similarity = corpus
            .iter()
            .map(|r| jaccard_similarity(&features.factors, &r.factors))
            .sum::<f64>()
            / n;
        let factor = (1.0 - mean_similarity).clamp(0.0, 1.0);

        let combination = corpus
            .iter()
            .map(|r| combination_distance(&features.combination, &r.combination))
            .sum::<f64>()
            / n;

        let logic = complexity_deviation(&features.complexity, corpus);

        let total = (self.weights.factor * factor
            + self.weights.combination * combination
            + self.weights.logic * logic)
            .clamp(0.0, 1.0);

        NoveltyBreakdown { factor, combination, logic, total }
    }

    /// Set `novelty_score` on every individual, each scored against the
    /// baselines and every other slot of the population.
    pub fn annotate(&self, individuals: &mut [Individual]) {
        let features: Vec<GenomeFeatures> = individuals.iter().map(GenomeFeatures::extract).collect();

        for (i, ind) in individuals.iter_mut().enumerate() {
            let corpus: Vec<&GenomeFeatures> = self
                .baselines
                .iter()
                .chain(features.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, f)| f))
                .collect();
            ind.novelty_score = Some(self.score_features(&features[i], &corpus).total);
        }
    }

    /// Mean pairwise Jaccard distance of factor sets.
    pub fn diversity(individuals: &[Individual]) -> f64 {
        let sets: Vec<BTreeSet<String>> = individuals
            .iter()
            .map(|i| GenomeFeatures::extract(i).factors)
            .collect();
        mean_pairwise_distance(&sets)
    }
}

pub fn mean_pairwise_distance(sets: &[BTreeSet<String>]) -> f64 {
    if sets.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += 1.0 - jaccard_similarity(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

fn combination_distance(a: &CombinationProfile, b: &CombinationProfile) -> f64 {
    let domain_gap = (a.domain_count as f64 - b.domain_count as f64).abs() / DOMAIN_COUNT as f64;
    let nonlinear_gap = if a.nonlinear != b.nonlinear { 1.0 } else { 0.0 };
    let weighting_gap = if a.custom_weighting != b.custom_weighting { 1.0 } else { 0.0 };
    (domain_gap.min(1.0) + nonlinear_gap + weighting_gap) / 3.0
}

/// Mean over the three complexity dimensions of |x - corpus mean| / range,
/// where the range spans the corpus and `x` itself.
fn complexity_deviation(profile: &ComplexityProfile, corpus: &[&GenomeFeatures]) -> f64 {
    let own = profile.dims();
    let n = corpus.len() as f64;
    let mut deviation = 0.0;

    for d in 0..3 {
        let values: Vec<f64> = corpus.iter().map(|r| r.complexity.dims()[d]).collect();
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(own[d], f64::min);
        let max = values.iter().copied().fold(own[d], f64::max);
        let range = max - min;
        if range > 0.0 {
            deviation += (own[d] - mean).abs() / range;
        }
    }

    (deviation / 3.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn individual(template: StrategyTemplate) -> Individual {
        Individual::new(template, template.baseline_parameters(), None, 0)
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        assert!(NoveltyWeights::new(0.3, 0.4, 0.3).is_ok());
        assert!(NoveltyWeights::new(0.0, 1.0, 0.0).is_ok());
        assert!(NoveltyWeights::new(0.3, 0.4, 0.3 + 5e-7).is_ok());
        assert!(NoveltyWeights::new(0.3, 0.4, 0.3 + 2e-6).is_err());
        assert!(NoveltyWeights::new(0.5, 0.5, 0.5).is_err());
        assert!(NoveltyWeights::new(-0.2, 0.6, 0.6).is_err());
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<String> = ["close", "volume"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["close", "atr"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard_similarity(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard_similarity(&a, &a), 1.0);
        assert_eq!(jaccard_similarity(&BTreeSet::new(), &BTreeSet::new()), 1.0);
    }

    #[test]
    fn test_duplicate_scores_lower_than_distinct() {
        let analyzer = NoveltyAnalyzer::without_baselines(NoveltyWeights::default());
        let base = individual(StrategyTemplate::MomentumCrossover);
        let twin = individual(StrategyTemplate::MomentumCrossover);
        let other = individual(StrategyTemplate::MultiFactor);

        let twin_score = analyzer.score(&base, &[&twin]);
        let other_score = analyzer.score(&base, &[&other]);
        assert_eq!(twin_score, 0.0);
        assert!(other_score > twin_score);
        assert!(other_score <= 1.0);
    }

    #[test]
    fn test_empty_reference_is_fully_novel() {
        let analyzer = NoveltyAnalyzer::without_baselines(NoveltyWeights::default());
        let ind = individual(StrategyTemplate::Breakout);
        assert_eq!(analyzer.score(&ind, &[]), 1.0);
    }

    #[test]
    fn test_disabled_layer_contributes_nothing() {
        let only_factor = NoveltyAnalyzer::without_baselines(NoveltyWeights::new(1.0, 0.0, 0.0).unwrap());
        let a = individual(StrategyTemplate::MomentumCrossover);
        let b = individual(StrategyTemplate::MeanReversion);
        let fa = GenomeFeatures::extract(&a);
        let fb = GenomeFeatures::extract(&b);
        let breakdown = only_factor.score_features(&fa, &[&fb]);
        assert!((breakdown.total - breakdown.factor).abs() < 1e-12);
    }

    #[test]
    fn test_code_features() {
        let code = "let signal = rank(close) * zscore(pe_ratio);\nif signal > 0.0 {\n    if volume > 1.0 {\n        buy();\n    }\n}\n";
        let features = GenomeFeatures::from_genome(
            StrategyTemplate::MomentumCrossover,
            &StrategyTemplate::MomentumCrossover.baseline_parameters(),
            Some(code),
        );
        assert!(features.combination.nonlinear);
        assert!(features.factors.contains("pe_ratio"));
        assert!(features.factors.contains("volume"));
        assert_eq!(features.complexity.nesting_depth, 2);
    }

    #[test]
    fn test_population_diversity() {
        let same = vec![
            individual(StrategyTemplate::Breakout),
            individual(StrategyTemplate::Breakout),
        ];
        assert_eq!(NoveltyAnalyzer::diversity(&same), 0.0);

        let mixed = vec![
            individual(StrategyTemplate::Breakout),
            individual(StrategyTemplate::MultiFactor),
        ];
        assert!(NoveltyAnalyzer::diversity(&mixed) > 0.0);
        assert_eq!(NoveltyAnalyzer::diversity(&mixed[..1]), 0.0);
    }

    #[test]
    fn test_annotate_excludes_own_slot() {
        let analyzer = NoveltyAnalyzer::without_baselines(NoveltyWeights::default());
        let mut individuals = vec![individual(StrategyTemplate::Breakout)];
        analyzer.annotate(&mut individuals);
        assert_eq!(individuals[0].novelty_score, Some(1.0));
    }
}
