use crate::engines::generation::generator::{hybridize_with_timeout, CodeValidator, GeneratorError, StrategyGenerator};
use crate::engines::generation::genome::Individual;
use crate::functions::StrategyTemplate;
use crate::types::Parameters;
use log::warn;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// A child genome under construction, before it becomes an [`Individual`].
#[derive(Debug, Clone, PartialEq)]
pub struct Offspring {
    pub template: StrategyTemplate,
    pub parameters: Parameters,
    pub code: Option<String>,
}

impl Offspring {
    /// Copy of a parent's genome. Code is kept only if `keep_code`.
    pub fn from_parent(parent: &Individual, keep_code: bool) -> Self {
        Self {
            template: parent.template(),
            parameters: parent.parameters().clone(),
            code: if keep_code { parent.code().map(str::to_string) } else { None },
        }
    }

    pub fn into_individual(self, generation_born: usize) -> Individual {
        Individual::new(self.template, self.parameters, self.code, generation_born)
    }
}

/// Uniform parameter crossover.
///
/// The template comes from a coin-flipped parent. Each schema parameter is
/// taken from either parent by coin flip when both carry it, otherwise from
/// the template parent. The result is clamped into the schema.
pub fn uniform_crossover<R: Rng>(a: &Individual, b: &Individual, rng: &mut R) -> Offspring {
    let (primary, other) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };
    let template = primary.template();

    let mut parameters = Parameters::new();
    for spec in template.schema() {
        let own = primary.parameters().get(spec.name);
        let foreign = other.parameters().get(spec.name);
        let value = match (own, foreign) {
            (Some(x), Some(y)) => {
                if rng.gen_bool(0.5) {
                    x.clone()
                } else {
                    y.clone()
                }
            }
            (Some(x), None) => x.clone(),
            (None, Some(y)) => y.clone(),
            (None, None) => spec.domain.midpoint(),
        };
        parameters.insert(spec.name.to_string(), value);
    }

    Offspring {
        template,
        parameters: template.clamp_parameters(&parameters),
        code: None,
    }
}

/// Crossover operator with optional code hybridization.
pub struct Crossover {
    generator: Option<Arc<dyn StrategyGenerator>>,
    validator: CodeValidator,
    timeout: Option<Duration>,
}

impl Crossover {
    /// Parameter-only crossover.
    pub fn parameters_only() -> Self {
        Self { generator: None, validator: CodeValidator::default(), timeout: None }
    }

    /// Crossover that also asks `generator` to hybridize parent code.
    pub fn with_hybridization(
        generator: Arc<dyn StrategyGenerator>,
        validator: CodeValidator,
        timeout: Option<Duration>,
    ) -> Self {
        Self { generator: Some(generator), validator, timeout }
    }

    /// Produce one child. Returns the hybridization failure, if any, next
    /// to the child; the child then carries no code.
    pub fn cross<R: Rng>(
        &self,
        a: &Individual,
        b: &Individual,
        rng: &mut R,
    ) -> (Offspring, Option<GeneratorError>) {
        let mut child = uniform_crossover(a, b, rng);

        let (Some(generator), Some(code_a), Some(code_b)) = (&self.generator, a.code(), b.code()) else {
            return (child, None);
        };

        match hybridize_with_timeout(generator, &self.validator, code_a, code_b, self.timeout) {
            Ok(code) => {
                child.code = Some(code);
                (child, None)
            }
            Err(e) => {
                warn!(
                    "Hybridization of {} and {} failed, using parameter crossover: {}",
                    a.genome_id(),
                    b.genome_id(),
                    e
                );
                (child, Some(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::generator::TemplateCodeGenerator;
    use crate::types::Value;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn with_code(template: StrategyTemplate) -> Individual {
        let params = template.baseline_parameters();
        let code = TemplateCodeGenerator::new().generate(template, &params).unwrap();
        Individual::new(template, params, Some(code), 0)
    }

    #[test]
    fn test_child_respects_template_schema() {
        let mut params_a = StrategyTemplate::MomentumCrossover.baseline_parameters();
        params_a.insert("fast_window".to_string(), Value::Integer(3));
        let a = Individual::new(StrategyTemplate::MomentumCrossover, params_a, None, 0);
        let b = Individual::new(
            StrategyTemplate::MultiFactor,
            StrategyTemplate::MultiFactor.baseline_parameters(),
            None,
            0,
        );

        let mut rng = StdRng::seed_from_u64(5);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..64 {
            let child = uniform_crossover(&a, &b, &mut rng);
            assert!(child.template.validate_parameters(&child.parameters).is_ok());
            assert!(child.code.is_none());
            seen.insert(child.template);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_same_template_mixes_parameters() {
        let t = StrategyTemplate::MeanReversion;
        let mut pa = t.baseline_parameters();
        let mut pb = t.baseline_parameters();
        pa.insert("lookback".to_string(), Value::Integer(10));
        pb.insert("lookback".to_string(), Value::Integer(100));
        let a = Individual::new(t, pa, None, 0);
        let b = Individual::new(t, pb, None, 0);

        let mut rng = StdRng::seed_from_u64(9);
        let mut lookbacks = std::collections::BTreeSet::new();
        for _ in 0..64 {
            let child = uniform_crossover(&a, &b, &mut rng);
            if let Some(Value::Integer(v)) = child.parameters.get("lookback") {
                lookbacks.insert(*v);
            }
        }
        assert_eq!(lookbacks.into_iter().collect::<Vec<_>>(), vec![10, 100]);
    }

    #[test]
    fn test_hybridization_failure_falls_back() {
        struct Broken;
        impl StrategyGenerator for Broken {
            fn generate(&self, _: StrategyTemplate, _: &Parameters) -> Result<String, GeneratorError> {
                Ok("x".to_string())
            }
            fn hybridize(&self, _: &str, _: &str) -> Result<String, GeneratorError> {
                Ok("fn broken( {".to_string())
            }
        }

        let crossover = Crossover::with_hybridization(Arc::new(Broken), CodeValidator::default(), None);
        let a = with_code(StrategyTemplate::Breakout);
        let b = with_code(StrategyTemplate::MeanReversion);
        let (child, failure) = crossover.cross(&a, &b, &mut StdRng::seed_from_u64(1));
        assert!(matches!(failure, Some(GeneratorError::InvalidOutput(_))));
        assert!(child.code.is_none());
        assert!(child.template.validate_parameters(&child.parameters).is_ok());
    }

    #[test]
    fn test_hybridization_success_attaches_code() {
        let crossover = Crossover::with_hybridization(
            Arc::new(TemplateCodeGenerator::new()),
            CodeValidator::default(),
            Some(Duration::from_secs(5)),
        );
        let a = with_code(StrategyTemplate::Breakout);
        let b = with_code(StrategyTemplate::MeanReversion);
        let (child, failure) = crossover.cross(&a, &b, &mut StdRng::seed_from_u64(1));
        assert!(failure.is_none());
        assert!(child.code.unwrap().contains("leg_b"));
    }

    #[test]
    fn test_parents_without_code_skip_hybridization() {
        let crossover = Crossover::with_hybridization(
            Arc::new(TemplateCodeGenerator::new()),
            CodeValidator::default(),
            None,
        );
        let a = Individual::new(StrategyTemplate::Breakout, StrategyTemplate::Breakout.baseline_parameters(), None, 0);
        let (child, failure) = crossover.cross(&a, &a, &mut StdRng::seed_from_u64(2));
        assert!(failure.is_none());
        assert!(child.code.is_none());
    }
}
