use crate::engines::evaluation::evaluator::Evaluation;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Cache key: genome content hash plus evaluation window fingerprint.
pub type FitnessKey = (String, String);

/// Memoized evaluation results shared by the evaluator's worker threads.
#[derive(Default)]
pub struct FitnessCache {
    data: Mutex<HashMap<FitnessKey, Evaluation>>,
}

impl FitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FitnessKey, Evaluation>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, genome_id: &str, fingerprint: &str) -> Option<Evaluation> {
        let data = self.lock();
        data.get(&(genome_id.to_string(), fingerprint.to_string())).cloned()
    }

    pub fn set(&self, genome_id: String, fingerprint: String, value: Evaluation) {
        let mut data = self.lock();
        data.insert((genome_id, fingerprint), value);
    }

    pub fn contains(&self, genome_id: &str, fingerprint: &str) -> bool {
        let data = self.lock();
        data.contains_key(&(genome_id.to_string(), fingerprint.to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
