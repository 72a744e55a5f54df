pub mod evaluator;
pub mod oracle;
pub mod splitter;
pub mod synthetic;

pub use evaluator::{Evaluation, EvaluationFailure, EvaluationReport, EvaluatorStats, FitnessEvaluator};
pub use oracle::{OracleError, OracleRequest, ScoringOracle};
pub use splitter::{DataSplit, DataSplitter, DataWindow, SimpleSplitter};
pub use synthetic::SyntheticOracle;
