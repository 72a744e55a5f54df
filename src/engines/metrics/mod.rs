pub mod objectives;

pub use objectives::{
    default_objectives, MultiObjectiveMetrics, ObjectiveConfig, OptimizationDirection,
};
