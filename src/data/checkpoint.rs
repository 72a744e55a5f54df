use crate::engines::generation::champion::{ChampionDocument, ChampionHistoryEntry, ChampionRecord, ChampionState};
use crate::engines::generation::genome::Individual;
use crate::engines::generation::mutation::MutationState;
use crate::error::{ForgeError, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const CHAMPION_FILE: &str = "champion.json";

/// Everything needed to resume a run after the last complete generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub generation: usize,
    pub population_size: usize,
    pub individuals: Vec<Individual>,
    pub champion_state: ChampionState,
    pub champion_record: Option<ChampionRecord>,
    pub champion_history: Vec<ChampionHistoryEntry>,
    pub mutation: MutationState,
}

impl Checkpoint {
    pub fn champion_document(&self) -> ChampionDocument {
        ChampionDocument {
            state: self.champion_state,
            champion: self.champion_record.clone(),
            history: self.champion_history.clone(),
        }
    }
}

/// Serialize `value` next to `path`, flush it to disk and rename it into
/// place, so readers only ever see a complete document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| ForgeError::Persistence(format!("Failed to serialize {}: {}", path.display(), e)))?;

    let write_err = |e: std::io::Error| ForgeError::Persistence(format!("Failed to write {}: {}", tmp_path.display(), e));
    let mut file = File::create(&tmp_path).map_err(write_err)?;
    file.write_all(&bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp_path, path)
        .map_err(|e| ForgeError::Persistence(format!("Failed to move {} into place: {}", path.display(), e)))?;

    // Persist the rename itself; not every platform can open a directory
    if let Some(parent) = path.parent() {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            debug!("Could not sync directory {}: {}", parent.display(), e);
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| ForgeError::Persistence(format!("Failed to read {}: {}", path.display(), e)))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| ForgeError::Persistence(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(value))
}

/// Checkpoint and champion files in one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    directory: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.directory.join(CHECKPOINT_FILE)
    }

    pub fn champion_path(&self) -> PathBuf {
        self.directory.join(CHAMPION_FILE)
    }

    fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.directory).map_err(|e| {
            ForgeError::Persistence(format!("Failed to create {}: {}", self.directory.display(), e))
        })
    }

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.ensure_directory()?;
        write_json_atomic(&self.checkpoint_path(), checkpoint)?;
        debug!("Checkpoint for generation {} written", checkpoint.generation);
        Ok(())
    }

    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let checkpoint: Option<Checkpoint> = read_json(&self.checkpoint_path())?;
        if let Some(cp) = &checkpoint {
            if let Some(bad) = cp.individuals.iter().find(|i| !i.verify_id()) {
                return Err(ForgeError::Persistence(format!(
                    "checkpoint individual {} does not match its genome",
                    bad.genome_id()
                )));
            }
        }
        Ok(checkpoint)
    }

    pub fn save_champion(&self, document: &ChampionDocument) -> Result<()> {
        self.ensure_directory()?;
        write_json_atomic(&self.champion_path(), document)
    }

    pub fn load_champion(&self) -> Result<Option<ChampionDocument>> {
        read_json(&self.champion_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("state"));
        assert!(store.load_checkpoint().unwrap().is_none());
        assert!(store.load_champion().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.checkpoint_path(), "{ not json").unwrap();
        assert!(matches!(store.load_checkpoint(), Err(ForgeError::Persistence(_))));
    }

    #[test]
    fn test_champion_document_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let document = ChampionDocument { state: ChampionState::NoChampion, champion: None, history: Vec::new() };
        store.save_champion(&document).unwrap();

        assert!(store.champion_path().exists());
        assert!(!store.champion_path().with_extension("tmp").exists());
        assert_eq!(store.load_champion().unwrap(), Some(document));
    }

    #[test]
    fn test_stale_temp_file_from_a_crash_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let tmp = store.champion_path().with_extension("tmp");
        fs::write(&tmp, "{\"state\": \"establi").unwrap();

        let document = ChampionDocument { state: ChampionState::NoChampion, champion: None, history: Vec::new() };
        store.save_champion(&document).unwrap();

        assert!(!tmp.exists());
        assert_eq!(store.load_champion().unwrap(), Some(document.clone()));
        let on_disk: ChampionDocument = serde_json::from_slice(&fs::read(store.champion_path()).unwrap()).unwrap();
        assert_eq!(on_disk, document);
    }
}
