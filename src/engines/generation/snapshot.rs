use crate::engines::generation::champion::{ChampionHistoryEntry, ChampionRecord, ChampionState};
use crate::engines::generation::genome::Individual;
use crate::engines::generation::population::Population;
use serde::{Deserialize, Serialize};

/// Read-only view of the engine for external reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSnapshot {
    pub generation: usize,
    pub population: Population,
    pub pareto_front: Vec<Individual>,
    pub champion_state: ChampionState,
    pub champion: Option<ChampionRecord>,
    pub champion_history: Vec<ChampionHistoryEntry>,
    pub diversity: f64,
    pub mutation_rate: f64,
}

impl EvolutionSnapshot {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
