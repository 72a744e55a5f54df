use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Evaluation failed for {genome_id}: {reason}")]
    Evaluation { genome_id: String, reason: String },

    #[error("Generator error: {0}")]
    Generation(String),

    #[error("Degenerate individual {genome_id}: {reason}")]
    DegenerateIndividual { genome_id: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Generation {generation} ended with zero viable individuals")]
    NoViableIndividuals { generation: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
