// src/store/memory.rs

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::anchor::AnchorRecord;
use crate::error::{AnchorError, Result};
use crate::store::{compute_statistics, AnchorStatistics, AnchorStore};

/// An in-memory anchor store, primarily for testing or ephemeral use.
///
/// Records are stored in a `DashMap` keyed by anchor id, with a second
/// `DashMap` holding the transaction-id → anchor-id index and a separate list
/// preserving insertion order for `recent_records`.
///
/// It also includes a mechanism to simulate storage failures for testing
/// error handling paths, configurable via `set_fail_on_insert`.
#[derive(Debug, Default)]
pub struct MemoryAnchorStore {
    records: DashMap<String, AnchorRecord>,
    tx_index: DashMap<String, String>,
    insertion_order: Mutex<Vec<String>>,
    fail_on_insert: Mutex<bool>,
}

impl MemoryAnchorStore {
    /// Creates a new, empty `MemoryAnchorStore` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures this store to fail the next calls to `insert_record`.
    pub fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.lock().expect("store mutex poisoned") = fail;
    }

    /// Checks if the store contains no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AnchorStore for MemoryAnchorStore {
    async fn insert_record(&self, record: AnchorRecord) -> Result<()> {
        if *self.fail_on_insert.lock().expect("store mutex poisoned") {
            return Err(AnchorError::storage(
                "simulated MemoryAnchorStore insert failure",
            ));
        }
        if self.records.contains_key(&record.id) {
            return Err(AnchorError::storage(format!(
                "anchor {} already exists",
                record.id
            )));
        }
        for tx_id in &record.transaction_ids {
            if let Some(existing) = self.tx_index.get(tx_id) {
                return Err(AnchorError::storage(format!(
                    "transaction {} is already mapped to anchor {}",
                    tx_id,
                    existing.value()
                )));
            }
        }

        // Record first, index second: a reader that finds an index entry must
        // always find the record behind it.
        let anchor_id = record.id.clone();
        let tx_ids = record.transaction_ids.clone();
        self.records.insert(anchor_id.clone(), record);
        for tx_id in tx_ids {
            self.tx_index.insert(tx_id, anchor_id.clone());
        }
        self.insertion_order
            .lock()
            .expect("store mutex poisoned")
            .push(anchor_id);
        Ok(())
    }

    async fn update_record(&self, record: &AnchorRecord) -> Result<()> {
        match self.records.get_mut(&record.id) {
            Some(mut entry) => {
                *entry.value_mut() = record.clone();
                Ok(())
            }
            None => Err(AnchorError::not_found(format!("anchor {}", record.id))),
        }
    }

    async fn get_record(&self, anchor_id: &str) -> Result<Option<AnchorRecord>> {
        Ok(self.records.get(anchor_id).map(|entry| entry.value().clone()))
    }

    async fn anchor_for_transaction(&self, tx_id: &str) -> Result<Option<String>> {
        Ok(self.tx_index.get(tx_id).map(|entry| entry.value().clone()))
    }

    async fn recent_records(&self, limit: usize) -> Result<Vec<AnchorRecord>> {
        let order = self.insertion_order.lock().expect("store mutex poisoned");
        let mut records = Vec::with_capacity(limit.min(order.len()));
        for anchor_id in order.iter().rev().take(limit) {
            if let Some(entry) = self.records.get(anchor_id) {
                records.push(entry.value().clone());
            }
        }
        Ok(records)
    }

    async fn record_count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn statistics(&self) -> Result<AnchorStatistics> {
        let records: Vec<AnchorRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        Ok(compute_statistics(records.iter()))
    }
}
