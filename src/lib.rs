//! Population-based multi-objective search over trading-strategy
//! parameterizations.
//!
//! The [`EvolutionEngine`] evaluates each generation through a
//! [`ScoringOracle`], ranks it with NSGA-II, annotates novelty, tracks a
//! probationary champion and breeds the next generation. State is
//! checkpointed after every generation so a run can resume.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod functions;
pub mod types;
pub mod utils;

pub use config::{AppConfig, ConfigManager};
pub use engines::evaluation::{DataWindow, FitnessEvaluator, OracleError, OracleRequest, ScoringOracle, SyntheticOracle};
pub use engines::generation::{
    CancellationToken, ChampionState, EvolutionEngine, EvolutionSnapshot, Individual, LogProgressCallback,
    ProgressCallback, RunSummary, StrategyGenerator, TemplateCodeGenerator,
};
pub use engines::metrics::{MultiObjectiveMetrics, ObjectiveConfig, OptimizationDirection};
pub use error::{ForgeError, Result};
pub use functions::StrategyTemplate;
