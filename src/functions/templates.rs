use crate::error::{ForgeError, Result};
use crate::types::{Parameters, Value};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Strategy families the engine can evolve.
///
/// Each variant owns a fixed parameter schema. Adding a family means one
/// variant here plus one schema table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTemplate {
    MomentumCrossover,
    MeanReversion,
    Breakout,
    MultiFactor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDomain {
    Integer { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Categorical(&'static [&'static str]),
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub domain: ParamDomain,
    /// Factor this parameter pulls in when switched on (bool true or numeric > 0).
    pub factor: Option<&'static str>,
}

const fn int(name: &'static str, min: i64, max: i64) -> ParamSpec {
    ParamSpec { name, domain: ParamDomain::Integer { min, max }, factor: None }
}

const fn float(name: &'static str, min: f64, max: f64) -> ParamSpec {
    ParamSpec { name, domain: ParamDomain::Float { min, max }, factor: None }
}

const fn weight(name: &'static str, factor: &'static str) -> ParamSpec {
    ParamSpec { name, domain: ParamDomain::Float { min: 0.0, max: 1.0 }, factor: Some(factor) }
}

const fn choice(name: &'static str, options: &'static [&'static str]) -> ParamSpec {
    ParamSpec { name, domain: ParamDomain::Categorical(options), factor: None }
}

const fn flag(name: &'static str, factor: &'static str) -> ParamSpec {
    ParamSpec { name, domain: ParamDomain::Bool, factor: Some(factor) }
}

const MOMENTUM_CROSSOVER: &[ParamSpec] = &[
    int("fast_window", 2, 50),
    int("slow_window", 10, 250),
    choice("signal_factor", &["close", "vwap", "returns", "momentum_20d"]),
    flag("filter_volume", "volume"),
    float("position_size", 0.1, 1.0),
];

const MEAN_REVERSION: &[ParamSpec] = &[
    int("lookback", 5, 120),
    float("entry_z", 0.5, 3.5),
    float("exit_z", 0.0, 1.5),
    choice("anchor_factor", &["close", "vwap", "bollinger_width"]),
    flag("filter_volatility", "realized_vol"),
    float("stop_loss", 0.01, 0.2),
];

const BREAKOUT: &[ParamSpec] = &[
    int("channel_window", 10, 120),
    float("atr_multiplier", 0.5, 4.0),
    flag("volume_confirm", "volume"),
    int("holding_period", 1, 40),
    flag("filter_trend", "momentum_20d"),
];

const MULTI_FACTOR: &[ParamSpec] = &[
    weight("momentum_weight", "momentum_20d"),
    weight("value_weight", "pe_ratio"),
    weight("quality_weight", "roe"),
    weight("sentiment_weight", "news_sentiment"),
    choice("combiner", &["linear", "zscore_sum", "rank_product"]),
    choice("flow_factor", &["northbound_flow", "margin_balance", "order_imbalance"]),
    int("rebalance_days", 1, 60),
    float("top_quantile", 0.05, 0.5),
    flag("filter_liquidity", "turnover_rate"),
];

impl StrategyTemplate {
    pub const ALL: [StrategyTemplate; 4] = [
        StrategyTemplate::MomentumCrossover,
        StrategyTemplate::MeanReversion,
        StrategyTemplate::Breakout,
        StrategyTemplate::MultiFactor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyTemplate::MomentumCrossover => "momentum_crossover",
            StrategyTemplate::MeanReversion => "mean_reversion",
            StrategyTemplate::Breakout => "breakout",
            StrategyTemplate::MultiFactor => "multi_factor",
        }
    }

    pub fn schema(&self) -> &'static [ParamSpec] {
        match self {
            StrategyTemplate::MomentumCrossover => MOMENTUM_CROSSOVER,
            StrategyTemplate::MeanReversion => MEAN_REVERSION,
            StrategyTemplate::Breakout => BREAKOUT,
            StrategyTemplate::MultiFactor => MULTI_FACTOR,
        }
    }

    /// Factors every instance of this template reads.
    pub fn base_factors(&self) -> &'static [&'static str] {
        match self {
            StrategyTemplate::MomentumCrossover => &["close", "momentum_20d"],
            StrategyTemplate::MeanReversion => &["close", "realized_vol"],
            StrategyTemplate::Breakout => &["high", "low", "atr"],
            StrategyTemplate::MultiFactor => &["momentum_20d"],
        }
    }

    /// Whether the template combines its inputs non-linearly by construction.
    pub fn nonlinear(&self) -> bool {
        matches!(self, StrategyTemplate::MeanReversion)
    }

    /// Conditional nesting depth of the rendered rule before filters.
    pub fn base_nesting(&self) -> usize {
        match self {
            StrategyTemplate::MomentumCrossover => 1,
            StrategyTemplate::MeanReversion => 2,
            StrategyTemplate::Breakout => 2,
            StrategyTemplate::MultiFactor => 1,
        }
    }

    pub fn spec(&self, name: &str) -> Option<&'static ParamSpec> {
        self.schema().iter().find(|s| s.name == name)
    }

    pub fn random_parameters<R: Rng>(&self, rng: &mut R) -> Parameters {
        self.schema()
            .iter()
            .map(|spec| (spec.name.to_string(), spec.domain.sample(rng)))
            .collect()
    }

    /// Mid-domain parameter set, used as the template's reference baseline.
    pub fn baseline_parameters(&self) -> Parameters {
        self.schema()
            .iter()
            .map(|spec| (spec.name.to_string(), spec.domain.midpoint()))
            .collect()
    }

    /// Bring a parameter set back onto this template's schema: unknown keys
    /// are dropped, missing keys take the midpoint, values are clamped.
    pub fn clamp_parameters(&self, parameters: &Parameters) -> Parameters {
        self.schema()
            .iter()
            .map(|spec| {
                let value = match parameters.get(spec.name) {
                    Some(v) => spec.domain.clamp(v),
                    None => spec.domain.midpoint(),
                };
                (spec.name.to_string(), value)
            })
            .collect()
    }

    pub fn validate_parameters(&self, parameters: &Parameters) -> Result<()> {
        for spec in self.schema() {
            let value = parameters.get(spec.name).ok_or_else(|| {
                ForgeError::Validation(format!(
                    "{} is missing parameter {}",
                    self.name(),
                    spec.name
                ))
            })?;
            if !spec.domain.contains(value) {
                return Err(ForgeError::Validation(format!(
                    "{}.{} = {} is outside its domain",
                    self.name(),
                    spec.name,
                    value
                )));
            }
        }
        if let Some(extra) = parameters.keys().find(|k| self.spec(k).is_none()) {
            return Err(ForgeError::Validation(format!(
                "{} has no parameter named {}",
                self.name(),
                extra
            )));
        }
        Ok(())
    }
}

impl ParamDomain {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Value {
        match *self {
            ParamDomain::Integer { min, max } => Value::Integer(rng.gen_range(min..=max)),
            ParamDomain::Float { min, max } => Value::Float(rng.gen_range(min..=max)),
            ParamDomain::Categorical(options) => {
                Value::Categorical(options[rng.gen_range(0..options.len())].to_string())
            }
            ParamDomain::Bool => Value::Bool(rng.gen_bool(0.5)),
        }
    }

    pub fn midpoint(&self) -> Value {
        match *self {
            ParamDomain::Integer { min, max } => Value::Integer(min + (max - min) / 2),
            ParamDomain::Float { min, max } => Value::Float(min + (max - min) / 2.0),
            ParamDomain::Categorical(options) => Value::Categorical(options[0].to_string()),
            ParamDomain::Bool => Value::Bool(false),
        }
    }

    /// Numeric width of the domain; zero for non-numeric domains.
    pub fn width(&self) -> f64 {
        match *self {
            ParamDomain::Integer { min, max } => (max - min) as f64,
            ParamDomain::Float { min, max } => max - min,
            _ => 0.0,
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        match (*self, value) {
            (ParamDomain::Integer { min, max }, Value::Integer(v)) => *v >= min && *v <= max,
            (ParamDomain::Float { min, max }, Value::Float(v)) => v.is_finite() && *v >= min && *v <= max,
            (ParamDomain::Categorical(options), Value::Categorical(s)) => options.contains(&s.as_str()),
            (ParamDomain::Bool, Value::Bool(_)) => true,
            _ => false,
        }
    }

    /// Coerce a value into this domain. Numbers are clamped, unknown
    /// categories and type mismatches fall back to the midpoint.
    pub fn clamp(&self, value: &Value) -> Value {
        match *self {
            ParamDomain::Integer { min, max } => match value.as_f64() {
                Some(v) if v.is_finite() => Value::Integer((v.round() as i64).clamp(min, max)),
                _ => self.midpoint(),
            },
            ParamDomain::Float { min, max } => match value.as_f64() {
                Some(v) if v.is_finite() => Value::Float(v.clamp(min, max)),
                _ => self.midpoint(),
            },
            ParamDomain::Categorical(options) => match value.as_str() {
                Some(s) if options.contains(&s) => value.clone(),
                _ => self.midpoint(),
            },
            ParamDomain::Bool => match value.as_bool() {
                Some(b) => Value::Bool(b),
                None => self.midpoint(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::factors;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_parameters_respect_schema() {
        let mut rng = StdRng::seed_from_u64(7);
        for template in StrategyTemplate::ALL {
            for _ in 0..50 {
                let params = template.random_parameters(&mut rng);
                assert!(template.validate_parameters(&params).is_ok());
            }
        }
    }

    #[test]
    fn test_clamp_parameters() {
        let template = StrategyTemplate::MomentumCrossover;
        let mut params = template.baseline_parameters();
        params.insert("fast_window".to_string(), Value::Integer(500));
        params.insert("position_size".to_string(), Value::Float(-3.0));
        params.insert("signal_factor".to_string(), Value::Categorical("bogus".to_string()));
        params.insert("unknown".to_string(), Value::Bool(true));
        params.remove("filter_volume");

        let clamped = template.clamp_parameters(&params);
        assert_eq!(clamped["fast_window"], Value::Integer(50));
        assert_eq!(clamped["position_size"], Value::Float(0.1));
        assert_eq!(clamped["signal_factor"], Value::Categorical("close".to_string()));
        assert_eq!(clamped["filter_volume"], Value::Bool(false));
        assert!(!clamped.contains_key("unknown"));
        assert!(template.validate_parameters(&clamped).is_ok());
    }

    #[test]
    fn test_schema_factors_are_in_catalog() {
        for template in StrategyTemplate::ALL {
            for f in template.base_factors() {
                assert!(factors::is_factor(f), "{} not in catalog", f);
            }
            for spec in template.schema() {
                if let Some(f) = spec.factor {
                    assert!(factors::is_factor(f), "{} not in catalog", f);
                }
            }
        }
    }
}
