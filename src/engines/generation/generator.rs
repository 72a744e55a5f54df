//! Strategy code generation.
//!
//! The language-model generator lives outside this crate; the engine only
//! sees the [`StrategyGenerator`] trait. [`TemplateCodeGenerator`] renders
//! plain template code so runs with code generation switched on have a
//! working collaborator.

use crate::functions::StrategyTemplate;
use crate::types::{Parameters, Value};
use crate::utils::{call_with_timeout, CallOutcome};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default cap on generated code length, in bytes.
pub const DEFAULT_MAX_CODE_LENGTH: usize = 16 * 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("generator failed: {0}")]
    Failed(String),

    #[error("generator timed out after {0:?}")]
    TimedOut(Duration),

    #[error("generator produced invalid code: {0}")]
    InvalidOutput(String),

    #[error("hybridization is not supported by this generator")]
    Unsupported,
}

impl From<GeneratorError> for crate::error::ForgeError {
    fn from(e: GeneratorError) -> Self {
        crate::error::ForgeError::Generation(e.to_string())
    }
}

/// Produces strategy code for a genome.
pub trait StrategyGenerator: Send + Sync {
    fn generate(&self, template: StrategyTemplate, parameters: &Parameters) -> Result<String, GeneratorError>;

    /// Blend two parents' code into one strategy.
    fn hybridize(&self, _code_a: &str, _code_b: &str) -> Result<String, GeneratorError> {
        Err(GeneratorError::Unsupported)
    }
}

/// Structural checks on generated code: non-empty, balanced brackets and
/// bounded length.
#[derive(Debug, Clone)]
pub struct CodeValidator {
    max_length: usize,
}

impl Default for CodeValidator {
    fn default() -> Self {
        Self { max_length: DEFAULT_MAX_CODE_LENGTH }
    }
}

impl CodeValidator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn validate(&self, code: &str) -> Result<(), GeneratorError> {
        if code.trim().is_empty() {
            return Err(GeneratorError::InvalidOutput("empty code".to_string()));
        }
        if code.len() > self.max_length {
            return Err(GeneratorError::InvalidOutput(format!(
                "code length {} exceeds maximum {}",
                code.len(),
                self.max_length
            )));
        }

        let mut stack = Vec::new();
        for (pos, c) in code.char_indices() {
            match c {
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Err(GeneratorError::InvalidOutput(format!(
                            "unbalanced '{}' at byte {}",
                            c, pos
                        )));
                    }
                }
                _ => {}
            }
        }
        if let Some(open) = stack.last() {
            return Err(GeneratorError::InvalidOutput(format!("unclosed '{}'", open)));
        }

        Ok(())
    }
}

/// Generate code under a deadline and validate the result.
pub fn generate_with_timeout(
    generator: &Arc<dyn StrategyGenerator>,
    validator: &CodeValidator,
    template: StrategyTemplate,
    parameters: &Parameters,
    timeout: Option<Duration>,
) -> Result<String, GeneratorError> {
    let generator = Arc::clone(generator);
    let parameters = parameters.clone();
    let outcome = call_with_timeout(timeout, move || generator.generate(template, &parameters));
    let code = settle(outcome, timeout)?;
    validator.validate(&code)?;
    Ok(code)
}

/// Hybridize two parents' code under a deadline and validate the result.
pub fn hybridize_with_timeout(
    generator: &Arc<dyn StrategyGenerator>,
    validator: &CodeValidator,
    code_a: &str,
    code_b: &str,
    timeout: Option<Duration>,
) -> Result<String, GeneratorError> {
    let generator = Arc::clone(generator);
    let (a, b) = (code_a.to_string(), code_b.to_string());
    let outcome = call_with_timeout(timeout, move || generator.hybridize(&a, &b));
    let code = settle(outcome, timeout)?;
    validator.validate(&code)?;
    Ok(code)
}

fn settle(
    outcome: CallOutcome<Result<String, GeneratorError>>,
    timeout: Option<Duration>,
) -> Result<String, GeneratorError> {
    match outcome {
        CallOutcome::Completed(result) => result,
        CallOutcome::TimedOut => Err(GeneratorError::TimedOut(timeout.unwrap_or_default())),
        CallOutcome::Crashed => Err(GeneratorError::Failed("generator worker panicked".to_string())),
    }
}

/// Renders a fixed code skeleton per template with the parameters inlined.
#[derive(Debug, Clone, Default)]
pub struct TemplateCodeGenerator;

impl TemplateCodeGenerator {
    pub fn new() -> Self {
        Self
    }

    fn body(template: StrategyTemplate, p: &Parameters) -> String {
        let flag = |name: &str| p.get(name).and_then(Value::as_bool).unwrap_or(false);
        let mut out = String::new();

        match template {
            StrategyTemplate::MomentumCrossover => {
                out.push_str("let fast = sma(signal_factor, fast_window);\n");
                out.push_str("let slow = sma(signal_factor, slow_window);\n");
                out.push_str("if fast > slow {\n");
                if flag("filter_volume") {
                    out.push_str("    if volume > sma(volume, slow_window) {\n");
                    out.push_str("        long(position_size);\n");
                    out.push_str("    }\n");
                } else {
                    out.push_str("    long(position_size);\n");
                }
                out.push_str("} else {\n    flat();\n}\n");
            }
            StrategyTemplate::MeanReversion => {
                out.push_str("let z = zscore(anchor_factor, lookback);\n");
                out.push_str("if z < -entry_z {\n");
                if flag("filter_volatility") {
                    out.push_str("    if realized_vol < sma(realized_vol, lookback) {\n");
                    out.push_str("        long(1.0);\n");
                    out.push_str("    }\n");
                } else {
                    out.push_str("    long(1.0);\n");
                }
                out.push_str("} else if z.abs() < exit_z {\n    flat();\n}\n");
                out.push_str("stop(stop_loss);\n");
            }
            StrategyTemplate::Breakout => {
                out.push_str("let upper = max(high, channel_window);\n");
                out.push_str("let band = atr_multiplier * atr(channel_window);\n");
                out.push_str("if close > upper + band {\n");
                let mut depth = 1;
                if flag("volume_confirm") {
                    out.push_str("    if volume > sma(volume, channel_window) {\n");
                    depth += 1;
                }
                if flag("filter_trend") {
                    let _ = writeln!(out, "{}if momentum_20d > 0.0 {{", "    ".repeat(depth));
                    depth += 1;
                }
                let _ = writeln!(out, "{}long_for(holding_period);", "    ".repeat(depth));
                for level in (0..depth).rev() {
                    let _ = writeln!(out, "{}}}", "    ".repeat(level));
                }
            }
            StrategyTemplate::MultiFactor => {
                out.push_str("let score = momentum_weight * momentum_20d\n");
                out.push_str("    + value_weight * pe_ratio\n");
                out.push_str("    + quality_weight * roe\n");
                out.push_str("    + sentiment_weight * news_sentiment;\n");
                out.push_str("let ranked = combine(combiner, score, flow_factor);\n");
                if flag("filter_liquidity") {
                    out.push_str("let universe = universe().filter(turnover_rate > 0.01);\n");
                } else {
                    out.push_str("let universe = universe();\n");
                }
                out.push_str("hold(top(universe, ranked, top_quantile), rebalance_days);\n");
            }
        }

        out
    }
}

impl StrategyGenerator for TemplateCodeGenerator {
    fn generate(&self, template: StrategyTemplate, parameters: &Parameters) -> Result<String, GeneratorError> {
        template
            .validate_parameters(parameters)
            .map_err(|e| GeneratorError::Failed(e.to_string()))?;

        let mut code = String::new();
        let _ = writeln!(code, "// {}", template.name());
        for (name, value) in parameters {
            let _ = writeln!(code, "let {} = {};", name, value);
        }
        code.push_str(&Self::body(template, parameters));
        Ok(code)
    }

    fn hybridize(&self, code_a: &str, code_b: &str) -> Result<String, GeneratorError> {
        let mut code = String::new();
        let _ = writeln!(code, "fn leg_a() {{\n{}}}", code_a);
        let _ = writeln!(code, "fn leg_b() {{\n{}}}", code_b);
        code.push_str("let blend = 0.5 * leg_a() + 0.5 * leg_b();\n");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_code_is_valid_for_every_template() {
        let generator = TemplateCodeGenerator::new();
        let validator = CodeValidator::default();
        for template in StrategyTemplate::ALL {
            let mut params = template.baseline_parameters();
            for spec in template.schema() {
                if spec.factor.is_some() && matches!(spec.domain, crate::functions::ParamDomain::Bool) {
                    params.insert(spec.name.to_string(), Value::Bool(true));
                }
            }
            let code = generator.generate(template, &params).unwrap();
            validator.validate(&code).unwrap();
        }
    }

    #[test]
    fn test_generate_rejects_bad_parameters() {
        let generator = TemplateCodeGenerator::new();
        let result = generator.generate(StrategyTemplate::Breakout, &Parameters::new());
        assert!(matches!(result, Err(GeneratorError::Failed(_))));
    }

    #[test]
    fn test_validator() {
        let v = CodeValidator::new(64);
        assert!(v.validate("let x = f(a[1]);").is_ok());
        assert!(v.validate("   ").is_err());
        assert!(v.validate("if x { f(a) ").is_err());
        assert!(v.validate("f(a]").is_err());
        assert!(v.validate(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_hybridize_default_is_unsupported() {
        struct Plain;
        impl StrategyGenerator for Plain {
            fn generate(&self, _: StrategyTemplate, _: &Parameters) -> Result<String, GeneratorError> {
                Ok("x".to_string())
            }
        }
        assert_eq!(Plain.hybridize("a", "b"), Err(GeneratorError::Unsupported));
    }

    #[test]
    fn test_generation_timeout() {
        struct Slow;
        impl StrategyGenerator for Slow {
            fn generate(&self, _: StrategyTemplate, _: &Parameters) -> Result<String, GeneratorError> {
                std::thread::sleep(Duration::from_millis(500));
                Ok("late".to_string())
            }
        }
        let generator: Arc<dyn StrategyGenerator> = Arc::new(Slow);
        let result = generate_with_timeout(
            &generator,
            &CodeValidator::default(),
            StrategyTemplate::Breakout,
            &StrategyTemplate::Breakout.baseline_parameters(),
            Some(Duration::from_millis(20)),
        );
        assert!(matches!(result, Err(GeneratorError::TimedOut(_))));
    }

    #[test]
    fn test_hybridized_code_validates() {
        let generator: Arc<dyn StrategyGenerator> = Arc::new(TemplateCodeGenerator::new());
        let a = generator
            .generate(StrategyTemplate::MeanReversion, &StrategyTemplate::MeanReversion.baseline_parameters())
            .unwrap();
        let b = generator
            .generate(StrategyTemplate::MultiFactor, &StrategyTemplate::MultiFactor.baseline_parameters())
            .unwrap();
        let hybrid =
            hybridize_with_timeout(&generator, &CodeValidator::default(), &a, &b, Some(Duration::from_secs(5))).unwrap();
        assert!(hybrid.contains("zscore"));
        assert!(hybrid.contains("pe_ratio"));
    }
}
