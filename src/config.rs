// ⚙️ Run configuration
//
// Passed explicitly to the driver; nothing here is global.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, SyncError};

/// Default records per flush (bulk) and per progress line (both strategies)
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Which synchronization strategy runs the import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Native upsert, batched, one transaction for the whole run
    #[default]
    Bulk,
    /// Read-compare-update per row, one transaction per entity
    Cursor,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Bulk => f.write_str("bulk"),
            StrategyKind::Cursor => f.write_str("cursor"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding departments.csv, employees.csv, dept_emp.csv, emp_salary.csv
    pub source_dir: PathBuf,
    pub database: PathBuf,
    pub strategy: StrategyKind,
    pub batch_size: usize,
    /// Let the bulk strategy resolve natural keys inside its write statements
    pub inline_key_resolution: bool,
    /// Empty all tables before synchronizing
    pub truncate: bool,
    /// Log the per-table summary after a successful run
    pub report_stats: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            source_dir: PathBuf::from("csv"),
            database: PathBuf::from("company.db"),
            strategy: StrategyKind::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            inline_key_resolution: true,
            truncate: false,
            report_stats: true,
        }
    }
}

impl SyncConfig {
    pub fn new(source_dir: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        SyncConfig {
            source_dir: source_dir.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch size must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();

        assert_eq!(config.batch_size, 500);
        assert_eq!(config.strategy, StrategyKind::Bulk);
        assert!(config.inline_key_resolution);
        assert!(!config.truncate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = SyncConfig::new("csv", "company.db").with_batch_size(0);

        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(StrategyKind::Cursor.to_string(), "cursor");
    }
}
