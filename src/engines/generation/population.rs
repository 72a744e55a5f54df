use crate::engines::generation::genome::Individual;
use crate::engines::metrics::ObjectiveConfig;
use crate::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One generation of individuals.
///
/// The population is the arena for a generation: other components look
/// individuals up by `genome_id` or borrow slices, and only the engine that
/// owns the population mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub generation: usize,
    pub size: usize,
    pub individuals: Vec<Individual>,
}

impl Population {
    pub fn new(generation: usize, individuals: Vec<Individual>) -> Self {
        let size = individuals.len();
        Self { generation, size, individuals }
    }

    /// Check that the population holds exactly `size` individuals.
    pub fn validate(&self) -> Result<()> {
        if self.individuals.len() != self.size {
            return Err(ForgeError::Validation(format!(
                "generation {} holds {} individuals, expected {}",
                self.generation,
                self.individuals.len(),
                self.size
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Position of the first individual carrying `genome_id`.
    pub fn index_of(&self, genome_id: &str) -> Option<usize> {
        self.individuals.iter().position(|i| i.genome_id() == genome_id)
    }

    pub fn get(&self, genome_id: &str) -> Option<&Individual> {
        self.index_of(genome_id).map(|idx| &self.individuals[idx])
    }

    /// `genome_id -> position` map for repeated lookups.
    pub fn index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.individuals.len());
        for (i, ind) in self.individuals.iter().enumerate() {
            index.entry(ind.genome_id()).or_insert(i);
        }
        index
    }

    pub fn viable<'a>(&'a self, objectives: &'a [ObjectiveConfig]) -> impl Iterator<Item = &'a Individual> + 'a {
        self.individuals.iter().filter(move |i| i.is_viable(objectives))
    }

    pub fn viable_count(&self, objectives: &[ObjectiveConfig]) -> usize {
        self.viable(objectives).count()
    }

    pub fn pending_count(&self) -> usize {
        self.individuals.iter().filter(|i| i.is_pending()).count()
    }

    /// Individuals on the first Pareto front (rank 0).
    pub fn pareto_front(&self) -> Vec<&Individual> {
        self.individuals.iter().filter(|i| i.rank == Some(0)).collect()
    }
}
