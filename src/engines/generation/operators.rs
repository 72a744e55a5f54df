use crate::engines::generation::genome::Individual;
use crate::engines::generation::pareto::crowded_ordering;
use crate::engines::metrics::ObjectiveConfig;
use rand::Rng;
use std::cmp::Ordering;

/// Tournament selection: pick `tournament_size` entrants with replacement
/// from `pool` (indices into `individuals`) and return the winner's index.
///
/// With probability `p_diversity` the most novel entrant wins; otherwise the
/// crowded-comparison winner does.
pub fn tournament_selection<R: Rng>(
    individuals: &[Individual],
    pool: &[usize],
    tournament_size: usize,
    p_diversity: f64,
    rng: &mut R,
) -> usize {
    let by_novelty = rng.gen::<f64>() < p_diversity;

    let mut best = pool[rng.gen_range(0..pool.len())];
    for _ in 1..tournament_size.max(1) {
        let challenger = pool[rng.gen_range(0..pool.len())];
        let better = if by_novelty {
            novelty_ordering(&individuals[challenger], &individuals[best]) == Ordering::Less
        } else {
            crowded_ordering(&individuals[challenger], &individuals[best]) == Ordering::Less
        };
        if better {
            best = challenger;
        }
    }

    best
}

/// Higher novelty first; ties fall back to crowded comparison.
fn novelty_ordering(a: &Individual, b: &Individual) -> Ordering {
    let na = a.novelty_score.unwrap_or(0.0);
    let nb = b.novelty_score.unwrap_or(0.0);
    nb.total_cmp(&na).then_with(|| crowded_ordering(a, b))
}

/// Individuals eligible as parents: every viable one, or the whole
/// population when none is viable.
pub fn selection_pool(individuals: &[Individual], objectives: &[ObjectiveConfig]) -> Vec<usize> {
    let viable: Vec<usize> = individuals
        .iter()
        .enumerate()
        .filter(|(_, ind)| ind.is_viable(objectives))
        .map(|(i, _)| i)
        .collect();
    if viable.is_empty() {
        (0..individuals.len()).collect()
    } else {
        viable
    }
}

/// Tournament selection parameters.
#[derive(Debug, Clone)]
pub struct Selector {
    pub tournament_size: usize,
    pub p_diversity: f64,
    pub objectives: Vec<ObjectiveConfig>,
}

impl Selector {
    pub fn new(tournament_size: usize, p_diversity: f64, objectives: Vec<ObjectiveConfig>) -> Self {
        Self { tournament_size, p_diversity, objectives }
    }

    /// `n` parents chosen with replacement. Empty when the population is.
    pub fn select_parents<'a, R: Rng>(
        &self,
        individuals: &'a [Individual],
        n: usize,
        rng: &mut R,
    ) -> Vec<&'a Individual> {
        if individuals.is_empty() {
            return Vec::new();
        }
        let pool = selection_pool(individuals, &self.objectives);
        (0..n)
            .map(|_| {
                let idx = tournament_selection(individuals, &pool, self.tournament_size, self.p_diversity, rng);
                &individuals[idx]
            })
            .collect()
    }
}
