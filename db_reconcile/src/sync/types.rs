//! Types shared by row reconciliation and group status checks

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Schema read on each side; `None` means the session's current schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaScope {
    pub source: Option<String>,
    pub target: Option<String>,
}

impl SchemaScope {
    pub fn new(source: Option<&str>, target: Option<&str>) -> Self {
        Self {
            source: source.map(str::to_string),
            target: target.map(str::to_string),
        }
    }

    /// The same schema name on both sides
    pub fn same(schema: Option<&str>) -> Self {
        Self::new(schema, schema)
    }
}

/// Which buckets a table sync may write, and the key that identifies rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    pub insert_missing: bool,
    pub update_different: bool,
    pub delete_extra: bool,
    pub primary_keys: Vec<String>,
    /// Rows per batch; the engine default applies when unset
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl SyncOptions {
    /// Options with every bucket disabled
    pub fn new(primary_keys: &[&str]) -> Self {
        Self {
            primary_keys: primary_keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn insert_missing(mut self, enabled: bool) -> Self {
        self.insert_missing = enabled;
        self
    }

    pub fn update_different(mut self, enabled: bool) -> Self {
        self.update_different = enabled;
        self
    }

    pub fn delete_extra(mut self, enabled: bool) -> Self {
        self.delete_extra = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_keys.is_empty() {
            return Err(Error::Configuration(
                "at least one key column is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for key in &self.primary_keys {
            if key.trim().is_empty() {
                return Err(Error::Configuration("key column names cannot be empty".to_string()));
            }
            if !seen.insert(key.to_lowercase()) {
                return Err(Error::Configuration(format!("key column '{}' listed twice", key)));
            }
        }
        if self.batch_size == Some(0) {
            return Err(Error::Configuration("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Row presence comparison for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDiff {
    pub table: String,
    pub source_count: u64,
    pub target_count: u64,
    /// `None` when no usable key exists on both sides
    pub missing_in_target: Option<u64>,
    pub missing_in_source: Option<u64>,
}

impl RowDiff {
    pub fn in_sync(&self) -> bool {
        self.source_count == self.target_count
            && self.missing_in_target.unwrap_or(0) == 0
            && self.missing_in_source.unwrap_or(0) == 0
    }
}

/// Bucket sizes found by a sync, whether or not they were applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
}

/// Outcome of reconciling one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub table: String,
    pub run_id: Uuid,
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    /// One entry per failed batch
    pub errors: Vec<String>,
    pub row_diff: Option<RowDiff>,
    pub pending: PendingCounts,
    /// Why a bucket was not applied
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl SyncResult {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            run_id: Uuid::new_v4(),
            inserted: 0,
            updated: 0,
            deleted: 0,
            errors: Vec::new(),
            row_diff: None,
            pending: PendingCounts::default(),
            skipped: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty() || self.cancelled
    }

    /// Total rows written
    pub fn applied(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Turn batch failures into `PartialFailure`
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            return Ok(self);
        }
        Err(Error::PartialFailure {
            succeeded: self.applied() as usize,
            failed: self.errors.len(),
            errors: self.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SyncOptions::new(&[]))]
    #[case(SyncOptions::new(&["id", "ID"]))]
    #[case(SyncOptions::new(&[" "]))]
    #[case(SyncOptions::new(&["id"]).batch_size(0))]
    fn rejects_bad_options(#[case] options: SyncOptions) {
        assert!(matches!(options.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn partial_result_converts_to_error() {
        let mut result = SyncResult::new("users");
        result.inserted = 3;
        result.errors.push("batch 2 failed".into());
        match result.into_result() {
            Err(Error::PartialFailure { succeeded, failed, .. }) => {
                assert_eq!(succeeded, 3);
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
