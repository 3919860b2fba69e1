// src/store/file.rs

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::anchor::AnchorRecord;
use crate::error::{AnchorError, Result};
use crate::store::{compute_statistics, AnchorStatistics, AnchorStore};

/// File-backed anchor store.
///
/// The full record set and transaction index are serialized to a single JSON
/// state file after every mutation and reloaded on open, so anchors survive a
/// restart. Anchor volume is batch-level, which keeps the state file small;
/// a relational backend would replace this for real deployments.
#[derive(Debug)]
pub struct FileAnchorStore {
    state: Mutex<PersistedState>,
    base_path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    records: HashMap<String, AnchorRecord>,
    tx_index: HashMap<String, String>,
    insertion_order: Vec<String>,
}

impl FileAnchorStore {
    /// Opens (or creates) a store rooted at `base_path`, loading any
    /// previously persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing state file cannot be read or parsed.
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        let state_file = Self::state_file(&base_path);
        let state = if state_file.exists() {
            let data = fs::read(&state_file)?;
            serde_json::from_slice(&data)?
        } else {
            PersistedState::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            base_path,
        })
    }

    fn state_file(path: &Path) -> PathBuf {
        path.join("anchor_state.json")
    }

    fn persist(&self, state: &PersistedState) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        let data = serde_json::to_vec(state)?;
        fs::write(Self::state_file(&self.base_path), data)?;
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for FileAnchorStore {
    async fn insert_record(&self, record: AnchorRecord) -> Result<()> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if state.records.contains_key(&record.id) {
            return Err(AnchorError::storage(format!(
                "anchor {} already exists",
                record.id
            )));
        }
        for tx_id in &record.transaction_ids {
            if let Some(existing) = state.tx_index.get(tx_id) {
                return Err(AnchorError::storage(format!(
                    "transaction {} is already mapped to anchor {}",
                    tx_id, existing
                )));
            }
        }

        let anchor_id = record.id.clone();
        for tx_id in &record.transaction_ids {
            state.tx_index.insert(tx_id.clone(), anchor_id.clone());
        }
        state.records.insert(anchor_id.clone(), record);
        state.insertion_order.push(anchor_id);
        self.persist(&state)
    }

    async fn update_record(&self, record: &AnchorRecord) -> Result<()> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if !state.records.contains_key(&record.id) {
            return Err(AnchorError::not_found(format!("anchor {}", record.id)));
        }
        state.records.insert(record.id.clone(), record.clone());
        self.persist(&state)
    }

    async fn get_record(&self, anchor_id: &str) -> Result<Option<AnchorRecord>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.records.get(anchor_id).cloned())
    }

    async fn anchor_for_transaction(&self, tx_id: &str) -> Result<Option<String>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.tx_index.get(tx_id).cloned())
    }

    async fn recent_records(&self, limit: usize) -> Result<Vec<AnchorRecord>> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .insertion_order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    async fn record_count(&self) -> Result<usize> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.records.len())
    }

    async fn statistics(&self) -> Result<AnchorStatistics> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(compute_statistics(state.records.values()))
    }
}
