pub mod champion;
pub mod crossover;
pub mod evolution_engine;
pub mod generator;
pub mod genome;
pub mod mutation;
pub mod novelty;
pub mod operators;
pub mod pareto;
pub mod population;
pub mod progress;
pub mod snapshot;

pub use champion::{
    ChampionDecision, ChampionDocument, ChampionHistoryEntry, ChampionRecord, ChampionState, ChampionTracker,
    RetirementReason,
};
pub use crossover::{uniform_crossover, Crossover, Offspring};
pub use evolution_engine::{CancellationToken, EvolutionEngine, RunSummary};
pub use generator::{CodeValidator, GeneratorError, StrategyGenerator, TemplateCodeGenerator};
pub use genome::{genome_id, EvaluationStatus, Individual, NON_VIABLE_RANK};
pub use mutation::{AdaptiveMutation, MutationState, Mutator, RateAdjustment};
pub use novelty::{GenomeFeatures, NoveltyAnalyzer, NoveltyBreakdown, NoveltyWeights};
pub use operators::{tournament_selection, Selector};
pub use pareto::{crowded_ordering, dominates, sorted_by_crowding, ParetoRanker};
pub use population::Population;
pub use progress::{ChannelProgressCallback, GenerationSummary, LogProgressCallback, ProgressCallback, ProgressMessage};
pub use snapshot::EvolutionSnapshot;
