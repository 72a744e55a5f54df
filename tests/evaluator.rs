use strategy_forge::config::EvaluationConfig;
use strategy_forge::engines::evaluation::{FitnessEvaluator, OracleError, OracleRequest, ScoringOracle};
use strategy_forge::engines::generation::{EvaluationStatus, Individual};
use strategy_forge::engines::metrics::default_objectives;
use strategy_forge::types::Value;
use strategy_forge::StrategyTemplate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Scores a genome by its `lookback`, optionally sleeping, failing the
/// first `fail_first` calls, or reporting zero trades.
#[derive(Default)]
struct TestOracle {
    calls: AtomicUsize,
    fail_first: usize,
    delay: Option<Duration>,
    jitter: bool,
    no_trades: bool,
}

impl ScoringOracle for TestOracle {
    fn evaluate(&self, request: &OracleRequest) -> Result<BTreeMap<String, f64>, OracleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(OracleError::Backtest(format!("transient failure {}", call)));
        }

        let lookback = request
            .parameters
            .get("lookback")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.jitter {
            // Larger lookbacks finish first
            thread::sleep(Duration::from_millis(200u64.saturating_sub(lookback as u64)));
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("sharpe".to_string(), lookback / 100.0);
        metrics.insert("max_drawdown".to_string(), -0.1);
        metrics.insert("turnover".to_string(), 0.3);
        metrics.insert("trade_count".to_string(), if self.no_trades { 0.0 } else { 25.0 });
        Ok(metrics)
    }
}

fn individual(lookback: i64) -> Individual {
    let template = StrategyTemplate::MeanReversion;
    let mut parameters = template.baseline_parameters();
    parameters.insert("lookback".to_string(), Value::Integer(lookback));
    Individual::new(template, parameters, None, 0)
}

fn config() -> EvaluationConfig {
    EvaluationConfig {
        oracle_timeout_ms: 5_000,
        max_retries: 0,
        ..EvaluationConfig::default()
    }
}

fn evaluator(oracle: Arc<TestOracle>, config: &EvaluationConfig) -> FitnessEvaluator {
    FitnessEvaluator::new(oracle, config, default_objectives()).unwrap()
}

#[test]
fn test_duplicate_genomes_hit_the_oracle_once() {
    let oracle = Arc::new(TestOracle::default());
    let config = config();
    let evaluator = evaluator(Arc::clone(&oracle), &config);
    let window = config.window();

    let mut population = vec![individual(10), individual(10), individual(20)];
    let report = evaluator.evaluate_population(&mut population, &window);

    assert_eq!(report.evaluated, 3);
    // Two distinct genomes, one in-sample and one out-of-sample call each
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
    assert_eq!(population[0].metrics, population[1].metrics);

    let mut next = vec![individual(10), individual(20)];
    evaluator.evaluate_population(&mut next, &window);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
    assert_eq!(evaluator.stats().cache_hits, 2);
    assert_eq!(evaluator.stats().cache_misses, 2);
    assert!(next.iter().all(|i| i.status == EvaluationStatus::Evaluated));
}

#[test]
fn test_results_follow_their_genome_not_completion_order() {
    let oracle = Arc::new(TestOracle { jitter: true, ..TestOracle::default() });
    let config = config();
    let evaluator = evaluator(oracle, &config);

    let mut population: Vec<Individual> = [5, 60, 120, 30].iter().map(|&l| individual(l)).collect();
    evaluator.evaluate_population(&mut population, &config.window());

    for (ind, lookback) in population.iter().zip([5.0, 60.0, 120.0, 30.0]) {
        let sharpe = ind.metrics.as_ref().and_then(|m| m.get("sharpe")).unwrap();
        assert!((sharpe - lookback / 100.0).abs() < 1e-12);
    }
}

#[test]
fn test_timeout_marks_failure_and_is_not_cached() {
    let oracle = Arc::new(TestOracle { delay: Some(Duration::from_millis(300)), ..TestOracle::default() });
    let config = EvaluationConfig { oracle_timeout_ms: 20, max_retries: 1, ..EvaluationConfig::default() };
    let evaluator = evaluator(Arc::clone(&oracle), &config);
    let window = config.window();

    let mut population = vec![individual(40)];
    let report = evaluator.evaluate_population(&mut population, &window);

    assert_eq!(report.failed, 1);
    assert!(matches!(population[0].status, EvaluationStatus::Failed { .. }));
    assert!(population[0].metrics.is_none());
    let stats = evaluator.stats();
    assert_eq!(stats.timeouts, 2);
    assert_eq!(stats.oracle_calls, 2);
    assert!(evaluator.cache().is_empty());

    let mut retry = vec![individual(40)];
    evaluator.evaluate_population(&mut retry, &window);
    assert_eq!(evaluator.stats().oracle_calls, 4);
}

/// Slow oracle that records how many calls run at the same time.
#[derive(Default)]
struct CrowdedOracle {
    live: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScoringOracle for CrowdedOracle {
    fn evaluate(&self, _request: &OracleRequest) -> Result<BTreeMap<String, f64>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(300));
        self.live.fetch_sub(1, Ordering::SeqCst);
        Err(OracleError::Backtest("too slow".to_string()))
    }
}

#[test]
fn test_abandoned_calls_count_against_the_concurrency_limit() {
    let oracle = Arc::new(CrowdedOracle::default());
    let config = EvaluationConfig {
        concurrency_limit: 1,
        oracle_timeout_ms: 20,
        max_retries: 2,
        ..EvaluationConfig::default()
    };
    let evaluator = FitnessEvaluator::new(Arc::clone(&oracle) as Arc<dyn ScoringOracle>, &config, default_objectives())
        .unwrap();

    let mut population = vec![individual(41), individual(42)];
    let report = evaluator.evaluate_population(&mut population, &config.window());
    assert_eq!(report.failed, 2);

    // Let the abandoned calls drain before reading the peak
    thread::sleep(Duration::from_millis(700));
    assert_eq!(oracle.live.load(Ordering::SeqCst), 0);
    assert_eq!(oracle.peak.load(Ordering::SeqCst), 1);

    let stats = evaluator.stats();
    assert_eq!(stats.oracle_calls, oracle.calls.load(Ordering::SeqCst));
    assert_eq!(stats.timeouts, 6);
    assert!(stats.oracle_calls < 6);
}

#[test]
fn test_transient_oracle_error_is_retried() {
    let oracle = Arc::new(TestOracle { fail_first: 1, ..TestOracle::default() });
    let config = EvaluationConfig { max_retries: 2, ..config() };
    let evaluator = evaluator(Arc::clone(&oracle), &config);

    let evaluation = evaluator.evaluate(&individual(50), &config.window()).unwrap();

    assert_eq!(evaluation.in_sample.get("sharpe"), Some(0.5));
    assert_eq!(evaluation.degenerate, None);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_retries_exhausted_reports_last_error() {
    let oracle = Arc::new(TestOracle { fail_first: 10, ..TestOracle::default() });
    let config = EvaluationConfig { max_retries: 2, ..config() };
    let evaluator = evaluator(Arc::clone(&oracle), &config);

    let failure = evaluator.evaluate(&individual(50), &config.window()).unwrap_err();

    assert!(failure.reason.contains("transient failure 2"));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_zero_activity_is_degenerate() {
    let oracle = Arc::new(TestOracle { no_trades: true, ..TestOracle::default() });
    let config = config();
    let evaluator = evaluator(oracle, &config);

    let mut population = vec![individual(70)];
    let report = evaluator.evaluate_population(&mut population, &config.window());

    assert_eq!(report.degenerate, 1);
    assert!(matches!(population[0].status, EvaluationStatus::Degenerate { .. }));
    assert!(population[0].metrics.is_some());
    assert!(!population[0].is_viable(&default_objectives()));
}

#[test]
fn test_revalidation_scores_the_whole_window() {
    let oracle = Arc::new(TestOracle::default());
    let config = config();
    let evaluator = evaluator(Arc::clone(&oracle), &config);
    let window = config.revalidation_window().unwrap();

    let evaluation = evaluator.revalidate(&individual(80), &window).unwrap();
    assert_eq!(evaluation.in_sample, evaluation.out_of_sample);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

    evaluator.revalidate(&individual(80), &window).unwrap();
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}
