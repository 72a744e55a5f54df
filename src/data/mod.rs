pub mod cache;
pub mod checkpoint;

pub use cache::FitnessCache;
pub use checkpoint::{Checkpoint, CheckpointStore, CHAMPION_FILE, CHECKPOINT_FILE};
