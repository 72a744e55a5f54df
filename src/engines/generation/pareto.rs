//! NSGA-II ranking: non-dominated fronts plus crowding distance.

use crate::engines::generation::genome::{Individual, NON_VIABLE_RANK};
use crate::engines::metrics::{ObjectiveConfig, OptimizationDirection};
use std::cmp::Ordering;

/// `a` dominates `b` when it is no worse on every objective and strictly
/// better on at least one. Vectors of mismatched length never dominate.
pub fn dominates(a: &[f64], b: &[f64], directions: &[OptimizationDirection]) -> bool {
    if a.len() != b.len() || a.len() != directions.len() {
        return false;
    }

    let mut strictly_better = false;
    for ((&x, &y), direction) in a.iter().zip(b).zip(directions) {
        let (x, y) = (direction.orient(x), direction.orient(y));
        if x < y {
            return false;
        }
        strictly_better |= x > y;
    }
    strictly_better
}

/// Partition `points` into Pareto fronts, best first. Each front lists
/// indices into `points` in ascending order.
pub fn fast_non_dominated_sort(points: &[Vec<f64>], directions: &[OptimizationDirection]) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut dominated_by = vec![0usize; n];
    let mut dominates_set: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(&points[i], &points[j], directions) {
                dominates_set[i].push(j);
                dominated_by[j] += 1;
            } else if dominates(&points[j], &points[i], directions) {
                dominates_set[j].push(i);
                dominated_by[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| dominated_by[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominates_set[i] {
                dominated_by[j] -= 1;
                if dominated_by[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(std::mem::replace(&mut current, next));
    }
    fronts
}

/// Crowding distance of each member of `front`, aligned with `front`.
///
/// Members sitting on either extreme of any objective (ties included) are
/// boundary points with infinite distance; fronts of one or two members
/// are all boundary. An objective whose values are all equal adds nothing
/// to interior members.
pub fn calculate_crowding_distance(points: &[Vec<f64>], front: &[usize]) -> Vec<f64> {
    let size = front.len();
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }

    let mut distance = vec![0.0; size];
    let num_objectives = points[front[0]].len();

    for obj in 0..num_objectives {
        let value = |slot: usize| points[front[slot]][obj];
        let mut order: Vec<usize> = (0..size).collect();
        order.sort_by(|&a, &b| value(a).total_cmp(&value(b)).then(a.cmp(&b)));

        let min = value(order[0]);
        let max = value(order[size - 1]);
        for &slot in &order {
            if value(slot) == min || value(slot) == max {
                distance[slot] = f64::INFINITY;
            }
        }

        let range = max - min;
        if range.abs() < 1e-12 {
            continue;
        }
        for k in 1..size - 1 {
            let slot = order[k];
            if distance[slot].is_finite() {
                distance[slot] += (value(order[k + 1]) - value(order[k - 1])) / range;
            }
        }
    }

    distance
}

/// Crowded comparison ordering on annotated individuals.
///
/// Lower rank first, then larger crowding distance, then `genome_id`.
/// Unranked individuals sort as non-viable.
pub fn crowded_ordering(a: &Individual, b: &Individual) -> Ordering {
    let rank_a = a.rank.unwrap_or(NON_VIABLE_RANK);
    let rank_b = b.rank.unwrap_or(NON_VIABLE_RANK);
    let crowd_a = a.crowding_distance.unwrap_or(0.0);
    let crowd_b = b.crowding_distance.unwrap_or(0.0);

    rank_a
        .cmp(&rank_b)
        .then_with(|| crowd_b.total_cmp(&crowd_a))
        .then_with(|| a.genome_id().cmp(b.genome_id()))
}

/// Population indices sorted best-first by [`crowded_ordering`].
pub fn sorted_by_crowding(individuals: &[Individual]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..individuals.len()).collect();
    order.sort_by(|&a, &b| crowded_ordering(&individuals[a], &individuals[b]).then(a.cmp(&b)));
    order
}

/// Assigns Pareto rank and crowding distance to a slice of individuals.
pub struct ParetoRanker {
    objectives: Vec<ObjectiveConfig>,
    directions: Vec<OptimizationDirection>,
}

impl ParetoRanker {
    pub fn new(objectives: Vec<ObjectiveConfig>) -> Self {
        let directions = objectives.iter().map(|c| c.direction).collect();
        Self { objectives, directions }
    }

    pub fn objectives(&self) -> &[ObjectiveConfig] {
        &self.objectives
    }

    /// Rank every individual in place and return the fronts as indices into
    /// `individuals`. Non-viable individuals get [`NON_VIABLE_RANK`] and zero
    /// crowding distance and appear in no front.
    pub fn rank(&self, individuals: &mut [Individual]) -> Vec<Vec<usize>> {
        let mut slots = Vec::new();
        let mut points = Vec::new();

        for (i, ind) in individuals.iter_mut().enumerate() {
            let vector = if ind.is_viable(&self.objectives) {
                ind.metrics.as_ref().and_then(|m| m.objective_vector(&self.objectives))
            } else {
                None
            };
            match vector {
                Some(values) => {
                    slots.push(i);
                    points.push(values);
                }
                None => {
                    ind.rank = Some(NON_VIABLE_RANK);
                    ind.crowding_distance = Some(0.0);
                }
            }
        }

        let fronts = fast_non_dominated_sort(&points, &self.directions);
        for (rank, front) in fronts.iter().enumerate() {
            let distances = calculate_crowding_distance(&points, front);
            for (&p, distance) in front.iter().zip(distances) {
                let ind = &mut individuals[slots[p]];
                ind.rank = Some(rank);
                ind.crowding_distance = Some(distance);
            }
        }

        fronts
            .into_iter()
            .map(|front| front.into_iter().map(|p| slots[p]).collect())
            .collect()
    }
}
