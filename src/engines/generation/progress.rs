use crate::engines::evaluation::EvaluatorStats;
use crate::engines::generation::champion::{ChampionDecision, ChampionState};
use log::info;
use serde::Serialize;

/// Per-generation summary handed to progress callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub generation: usize,
    pub population_size: usize,
    pub viable: usize,
    pub degenerate: usize,
    pub failed: usize,
    pub front_size: usize,
    /// Best direction-aware primary objective among viable individuals.
    pub best_primary: Option<f64>,
    pub diversity: f64,
    /// Rate the next generation is bred with.
    pub mutation_rate: f64,
    /// Rate this generation was bred with; `None` for an initial or resumed
    /// population.
    pub bred_with_rate: Option<f64>,
    pub champion_state: ChampionState,
    pub champion_id: Option<String>,
    pub evaluator: EvaluatorStats,
}

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, summary: &GenerationSummary);
    fn on_champion_decision(&mut self, _generation: usize, _decision: &ChampionDecision) {}
}

/// Reports progress through the `log` facade.
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        info!("Generation {} starting...", generation);
    }

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        info!(
            "Generation {} complete. viable {}/{}, front {}, best primary {}, diversity {:.3}, mutation rate {:.3}, champion {:?}",
            summary.generation,
            summary.viable,
            summary.population_size,
            summary.front_size,
            summary
                .best_primary
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "n/a".to_string()),
            summary.diversity,
            summary.mutation_rate,
            summary.champion_state,
        );
    }

    fn on_champion_decision(&mut self, generation: usize, decision: &ChampionDecision) {
        if *decision != ChampionDecision::Retained && *decision != ChampionDecision::NoCandidate {
            info!("Generation {} champion decision: {:?}", generation, decision);
        }
    }
}

/// Forwards progress to another thread.
pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete(GenerationSummary),
    ChampionDecision { generation: usize, decision: ChampionDecision },
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete(summary.clone()));
    }

    fn on_champion_decision(&mut self, generation: usize, decision: &ChampionDecision) {
        let _ = self.sender.send(ProgressMessage::ChampionDecision {
            generation,
            decision: decision.clone(),
        });
    }
}
