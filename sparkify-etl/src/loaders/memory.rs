//! In-memory row store
//!
//! Holds rows in arrival order with a natural-key index. The lake loader
//! deduplicates a partition's incoming rows through it, and indexes the
//! stored rows it is about to replace.

use super::RowStore;
use crate::error::StoreError;
use crate::models::{NaturalKey, Row};
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryRowStore {
    rows: Vec<Row>,
    index: HashMap<NaturalKey, usize>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with already-stored rows; the first row per natural key is kept
    pub fn from_rows<I: IntoIterator<Item = Row>>(rows: I) -> Self {
        let mut store = Self::new();
        for row in rows {
            let key = row.natural_key();
            if !store.index.contains_key(&key) {
                store.index.insert(key, store.rows.len());
                store.rows.push(row);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &NaturalKey) -> Option<&Row> {
        self.index.get(key).map(|&position| &self.rows[position])
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn exists(&mut self, key: &NaturalKey) -> Result<bool, StoreError> {
        Ok(self.index.contains_key(key))
    }

    async fn insert(&mut self, row: &Row) -> Result<(), StoreError> {
        let key = row.natural_key();
        if self.index.contains_key(&key) {
            return Err(StoreError::Fatal(format!(
                "duplicate natural key in {}: {:?}",
                row.entity().table_name(),
                key
            )));
        }
        self.index.insert(key, self.rows.len());
        self.rows.push(row.clone());
        Ok(())
    }

    async fn upsert(&mut self, row: &Row) -> Result<(), StoreError> {
        match self.index.get(&row.natural_key()) {
            Some(&position) => {
                self.rows[position] = row.clone();
                Ok(())
            }
            None => self.insert(row).await,
        }
    }
}
