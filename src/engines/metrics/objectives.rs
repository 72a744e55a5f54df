use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Defines whether a metric should be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationDirection {
    Maximize,
    Minimize,
}

impl OptimizationDirection {
    /// Map a raw value onto a scale where larger is always better.
    pub fn orient(&self, value: f64) -> f64 {
        match self {
            OptimizationDirection::Maximize => value,
            OptimizationDirection::Minimize => -value,
        }
    }
}

/// Configuration for a single objective in multi-objective optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    pub metric_name: String,
    pub direction: OptimizationDirection,
}

impl ObjectiveConfig {
    pub fn maximize(name: &str) -> Self {
        Self { metric_name: name.to_string(), direction: OptimizationDirection::Maximize }
    }

    pub fn minimize(name: &str) -> Self {
        Self { metric_name: name.to_string(), direction: OptimizationDirection::Minimize }
    }
}

/// Default objective set: risk-adjusted return first, then drawdown
/// (stored as a negative fraction, so less negative is better) and turnover.
pub fn default_objectives() -> Vec<ObjectiveConfig> {
    vec![
        ObjectiveConfig::maximize("sharpe"),
        ObjectiveConfig::maximize("max_drawdown"),
        ObjectiveConfig::minimize("turnover"),
    ]
}

/// Flat `name -> value` metric record returned by the scoring oracle.
///
/// Only finite values are stored, so the record always round-trips through JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiObjectiveMetrics {
    values: BTreeMap<String, f64>,
}

impl MultiObjectiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw oracle output, dropping non-finite entries.
    pub fn from_raw(raw: BTreeMap<String, f64>) -> Self {
        Self {
            values: raw.into_iter().filter(|(_, v)| v.is_finite()).collect(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        if value.is_finite() {
            self.values.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Objective vector in configuration order, or `None` if any objective
    /// is missing.
    pub fn objective_vector(&self, objectives: &[ObjectiveConfig]) -> Option<Vec<f64>> {
        objectives
            .iter()
            .map(|o| self.get(&o.metric_name))
            .collect()
    }

    /// Names of configured objectives absent from this record.
    pub fn missing_objectives(&self, objectives: &[ObjectiveConfig]) -> Vec<String> {
        objectives
            .iter()
            .filter(|o| self.get(&o.metric_name).is_none())
            .map(|o| o.metric_name.clone())
            .collect()
    }

    /// Primary (first) objective oriented so larger is better.
    pub fn primary_score(&self, objectives: &[ObjectiveConfig]) -> Option<f64> {
        let primary = objectives.first()?;
        self.get(&primary.metric_name)
            .map(|v| primary.direction.orient(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_drops_non_finite() {
        let mut raw = BTreeMap::new();
        raw.insert("sharpe".to_string(), 1.2);
        raw.insert("broken".to_string(), f64::NAN);
        raw.insert("inf".to_string(), f64::INFINITY);
        let metrics = MultiObjectiveMetrics::from_raw(raw);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics.get("sharpe"), Some(1.2));
    }

    #[test]
    fn test_objective_vector_requires_all() {
        let objectives = default_objectives();
        let partial = MultiObjectiveMetrics::new().with("sharpe", 1.0).with("max_drawdown", -0.1);
        assert!(partial.objective_vector(&objectives).is_none());
        assert_eq!(partial.missing_objectives(&objectives), vec!["turnover".to_string()]);

        let full = partial.with("turnover", 0.4);
        assert_eq!(full.objective_vector(&objectives), Some(vec![1.0, -0.1, 0.4]));
    }

    #[test]
    fn test_primary_score_orientation() {
        let objectives = vec![ObjectiveConfig::minimize("max_drawdown_pct")];
        let metrics = MultiObjectiveMetrics::new().with("max_drawdown_pct", 12.0);
        assert_eq!(metrics.primary_score(&objectives), Some(-12.0));
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let metrics = MultiObjectiveMetrics::new().with("sharpe", 1.5).with("turnover", 0.2);
        let json = serde_json::to_string(&metrics).unwrap();
        assert_eq!(json, r#"{"sharpe":1.5,"turnover":0.2}"#);
    }
}
