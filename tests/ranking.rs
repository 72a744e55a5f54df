use strategy_forge::engines::generation::{
    crowded_ordering, sorted_by_crowding, tournament_selection, Individual, ParetoRanker, NON_VIABLE_RANK,
};
use strategy_forge::engines::generation::pareto::{dominates, fast_non_dominated_sort};
use strategy_forge::engines::metrics::{default_objectives, MultiObjectiveMetrics, ObjectiveConfig, OptimizationDirection};
use strategy_forge::types::Value;
use strategy_forge::StrategyTemplate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

/// Distinct individual scored with the given objective values.
fn scored(seed: i64, sharpe: f64, drawdown: f64, turnover: f64) -> Individual {
    let template = StrategyTemplate::MomentumCrossover;
    let mut parameters = template.baseline_parameters();
    parameters.insert("fast_window".to_string(), Value::Integer(seed));
    let mut ind = Individual::new(template, parameters, None, 0);
    let metrics = MultiObjectiveMetrics::new()
        .with("sharpe", sharpe)
        .with("max_drawdown", drawdown)
        .with("turnover", turnover);
    ind.mark_evaluated(metrics.clone(), metrics);
    ind
}

fn sharpe_and_drawdown() -> Vec<ObjectiveConfig> {
    vec![ObjectiveConfig::maximize("sharpe"), ObjectiveConfig::maximize("max_drawdown")]
}

#[test]
fn test_two_objective_fronts() {
    let mut population = vec![
        scored(2, 2.0, -0.10, 0.5),
        scored(3, 1.8, -0.05, 0.5),
        scored(4, 1.0, -0.30, 0.5),
        scored(5, 0.5, -0.50, 0.5),
    ];
    let fronts = ParetoRanker::new(sharpe_and_drawdown()).rank(&mut population);

    assert_eq!(fronts, vec![vec![0, 1], vec![2], vec![3]]);
    let ranks: Vec<Option<usize>> = population.iter().map(|i| i.rank).collect();
    assert_eq!(ranks, vec![Some(0), Some(0), Some(1), Some(2)]);
}

#[test]
fn test_better_on_both_objectives_dominates() {
    let directions = [OptimizationDirection::Maximize, OptimizationDirection::Maximize];
    assert!(dominates(&[2.0, -0.1], &[1.5, -0.2], &directions));
    assert!(!dominates(&[1.5, -0.2], &[2.0, -0.1], &directions));

    let mut population = vec![scored(2, 1.5, -0.2, 0.5), scored(3, 2.0, -0.1, 0.5)];
    let fronts = ParetoRanker::new(sharpe_and_drawdown()).rank(&mut population);
    assert_eq!(fronts, vec![vec![1], vec![0]]);
    assert_eq!(population[1].rank, Some(0));
    assert_eq!(population[0].rank, Some(1));
}

#[test]
fn test_fronts_partition_random_populations() {
    use OptimizationDirection::{Maximize, Minimize};
    let directions = [Maximize, Minimize, Maximize];
    let mut rng = StdRng::seed_from_u64(97);

    for _ in 0..200 {
        let n = rng.gen_range(1..=30);
        // Coarse grid so ties and duplicates show up
        let points: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..directions.len()).map(|_| rng.gen_range(0..6) as f64).collect())
            .collect();
        let fronts = fast_non_dominated_sort(&points, &directions);

        let mut members: Vec<usize> = fronts.iter().flatten().copied().collect();
        members.sort_unstable();
        assert_eq!(members, (0..n).collect::<Vec<_>>());

        for &i in &fronts[0] {
            assert!((0..n).all(|j| !dominates(&points[j], &points[i], &directions)));
        }
        for k in 1..fronts.len() {
            for &i in &fronts[k] {
                assert!(fronts[k - 1].iter().any(|&j| dominates(&points[j], &points[i], &directions)));
            }
        }
        for (k, front) in fronts.iter().enumerate() {
            for &i in front {
                for later in &fronts[k..] {
                    assert!(later.iter().all(|&j| !dominates(&points[j], &points[i], &directions)));
                }
            }
        }
    }
}

#[test]
fn test_fronts_respect_mixed_directions() {
    // sharpe and max_drawdown are maximized, turnover minimized
    let mut population = vec![
        scored(2, 1.5, -0.10, 0.5),
        scored(3, 1.0, -0.05, 0.5),
        scored(4, 1.0, -0.10, 0.6),
        scored(5, 0.5, -0.20, 0.9),
    ];
    let fronts = ParetoRanker::new(default_objectives()).rank(&mut population);

    assert_eq!(fronts.len(), 3);
    assert_eq!(fronts[0], vec![0, 1]);
    assert_eq!(fronts[1], vec![2]);
    assert_eq!(fronts[2], vec![3]);
    assert_eq!(population[0].rank, Some(0));
    assert_eq!(population[2].rank, Some(1));
    assert_eq!(population[3].rank, Some(2));
}

#[test]
fn test_front_boundaries_get_infinite_crowding() {
    let mut population = vec![
        scored(2, 1.0, -0.30, 0.5),
        scored(3, 2.0, -0.20, 0.5),
        scored(4, 3.0, -0.10, 0.5),
        scored(5, 4.0, -0.40, 0.1),
    ];
    ParetoRanker::new(default_objectives()).rank(&mut population);

    let boundary = population
        .iter()
        .filter(|i| i.crowding_distance == Some(f64::INFINITY))
        .count();
    assert!(boundary >= 2);
    assert!(population.iter().all(|i| i.crowding_distance.unwrap() >= 0.0));
}

#[test]
fn test_non_viable_individuals_rank_last() {
    let mut failed = scored(9, 5.0, 0.0, 0.0);
    failed.mark_failed("oracle timed out".to_string());
    let mut degenerate = scored(10, 5.0, 0.0, 0.0);
    let m = degenerate.metrics.clone().unwrap();
    degenerate.mark_degenerate("no trades".to_string(), m.clone(), m);

    let mut population = vec![failed, scored(2, 0.1, -0.5, 0.9), degenerate];
    let fronts = ParetoRanker::new(default_objectives()).rank(&mut population);

    assert_eq!(fronts, vec![vec![1]]);
    assert_eq!(population[0].rank, Some(NON_VIABLE_RANK));
    assert_eq!(population[2].rank, Some(NON_VIABLE_RANK));
    assert_eq!(population[0].crowding_distance, Some(0.0));

    let order = sorted_by_crowding(&population);
    assert_eq!(order[0], 1);
}

#[test]
fn test_crowded_ordering_prefers_rank_then_spread() {
    let mut population = vec![
        scored(2, 1.0, -0.10, 0.5),
        scored(3, 2.0, -0.20, 0.6),
        scored(4, 3.0, -0.30, 0.7),
        scored(5, 0.5, -0.50, 0.9),
    ];
    ParetoRanker::new(default_objectives()).rank(&mut population);
    assert_eq!(population[1].rank, Some(0));
    assert!(population[1].crowding_distance.unwrap().is_finite());

    assert_eq!(crowded_ordering(&population[0], &population[3]), Ordering::Less);
    // Boundary point of front 0 beats the interior one
    assert_eq!(crowded_ordering(&population[0], &population[1]), Ordering::Less);
    assert_eq!(crowded_ordering(&population[1], &population[1]), Ordering::Equal);
}

#[test]
fn test_tournament_is_deterministic_for_a_seed() {
    let mut population: Vec<Individual> = (0..12)
        .map(|i| scored(i + 2, i as f64 * 0.1, -0.1 - i as f64 * 0.01, 0.5))
        .collect();
    ParetoRanker::new(default_objectives()).rank(&mut population);
    for (i, ind) in population.iter_mut().enumerate() {
        ind.novelty_score = Some(i as f64 / 12.0);
    }
    let pool: Vec<usize> = (0..population.len()).collect();

    let picks = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..20)
            .map(|_| tournament_selection(&population, &pool, 3, 0.2, &mut rng))
            .collect::<Vec<_>>()
    };
    assert_eq!(picks(11), picks(11));
}
