// Company Sync - Core Library
// Mirrors departments, employees, assignments and salary history from CSV
// into SQLite, idempotently, with two interchangeable strategies.

pub mod batch;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod model;
pub mod progress;
pub mod resolver;
pub mod source;
pub mod stats;
pub mod strategy;
pub mod sync;

// Re-export commonly used types
pub use config::{StrategyKind, SyncConfig, DEFAULT_BATCH_SIZE};
pub use db::{open_database, setup_database, truncate_tables, StoreCapabilities};
pub use detector::{detect, ChangeSet, FieldDiff};
pub use error::{Result, SyncError};
pub use model::{
    Assignment, Department, Employee, EmployeeName, EntityRecord, FieldType, FieldValue,
    SalaryRecord,
};
pub use resolver::KeyResolver;
pub use source::{EntityKind, RecordSource, SourceRecord};
pub use stats::{collect_stats, render_table, TableStats};
pub use strategy::{
    get_strategy, BulkUpsert, CommitScope, CursorUpsert, EntityReport, SyncStrategy,
};
pub use sync::{RunReport, Synchronizer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
