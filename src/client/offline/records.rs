//! Record store
//!
//! The local copy of every record the user has collected, keyed by
//! [`RecordKey`]. Upload outcomes only touch a record's sync state (and the
//! cover reference after an overridable conflict); the field data stays as
//! the user left it.

use crate::shared::record::{Record, RecordKey, RecordSyncState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl From<Vec<Record>> for RecordStore {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.iter().find(|record| record.matches(key))
    }

    fn get_mut(&mut self, key: &RecordKey) -> Option<&mut Record> {
        self.records.iter_mut().find(|record| record.matches(key))
    }

    /// Add a record, replacing any record with the same key
    pub fn insert(&mut self, record: Record) {
        if !self.update(record.clone()) {
            self.records.push(record);
        }
    }

    /// Replace the record with the same key; false if there is none
    pub fn update(&mut self, record: Record) -> bool {
        let Some(key) = record.key() else {
            return false;
        };
        match self.get_mut(&key) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &RecordKey) -> Option<Record> {
        let index = self.records.iter().position(|record| record.matches(key))?;
        Some(self.records.remove(index))
    }

    pub fn set_sync_state(&mut self, key: &RecordKey, state: RecordSyncState) -> bool {
        match self.get_mut(key) {
            Some(record) => {
                record.sync_state = Some(state);
                true
            }
            None => false,
        }
    }

    pub fn set_cover_id(&mut self, key: &RecordKey, cover_id: &str) -> bool {
        match self.get_mut(key) {
            Some(record) => {
                record.cover_id = Some(cover_id.to_string());
                true
            }
            None => false,
        }
    }
}
