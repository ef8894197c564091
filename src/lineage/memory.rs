//! In-process lineage store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::lineage::record::LineageRecord;
use crate::lineage::store::{check_swap, LineageStore, Result, StoreError};

/// Lineage records held in memory. Lost when the process exits.
#[derive(Default)]
pub struct MemoryLineageStore {
    records: RwLock<HashMap<String, LineageRecord>>,
}

impl MemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LineageStore for MemoryLineageStore {
    async fn get(&self, alias: &str) -> Result<Option<LineageRecord>> {
        let records = self.records.read().await;
        Ok(records.get(alias).cloned())
    }

    async fn create(&self, record: LineageRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.alias) {
            return Err(StoreError::AlreadyExists(record.alias));
        }
        records.insert(record.alias.clone(), record);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        alias: &str,
        expected_version: u64,
        mut next: LineageRecord,
    ) -> Result<LineageRecord> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(alias)
            .ok_or_else(|| StoreError::NotFound(alias.to_string()))?;

        check_swap(current, expected_version, &next)?;

        next.version = expected_version + 1;
        *current = next.clone();
        Ok(next)
    }

    async fn aliases(&self) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut aliases: Vec<String> = records.keys().cloned().collect();
        aliases.sort();
        Ok(aliases)
    }
}
