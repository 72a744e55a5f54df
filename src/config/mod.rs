pub mod traits;
pub mod champion;
pub mod checkpoint;
pub mod evaluation;
pub mod evolution;
pub mod manager;
pub mod novelty;

pub use manager::{AppConfig, ConfigManager};
pub use champion::ChampionConfig;
pub use checkpoint::CheckpointConfig;
pub use evaluation::EvaluationConfig;
pub use evolution::{EvolutionConfig, MutationConfig};
pub use novelty::NoveltyConfig;
pub use traits::ConfigSection;
