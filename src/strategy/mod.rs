// Synchronization Strategies
//
// Two ways to mirror one entity file into its table:
// - BulkUpsert: native upsert, batched round-trips, no field-level detection
// - CursorUpsert: fetch by natural key, diff, write only what changed
//
// The driver owns ordering and transactions; a strategy only declares how
// wide its unit of work is.

pub mod bulk;
pub mod cursor;

pub use bulk::BulkUpsert;
pub use cursor::CursorUpsert;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::StrategyKind;
use crate::db::StoreCapabilities;
use crate::error::{Result, SyncError};
use crate::model::EntityRecord;
use crate::source::{EntityKind, RecordSource, SourceRecord};

/// How much work one commit covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitScope {
    /// All four entity imports in one transaction
    Run,
    /// Each entity import commits on its own
    Entity,
}

/// Outcome of one entity import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub processed: usize,
    /// Row-level outcomes; only the cursor strategy can observe these
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Batches executed (bulk) or progress steps reported (cursor)
    pub flushes: usize,
}

impl EntityReport {
    pub fn new(kind: EntityKind) -> Self {
        EntityReport {
            kind,
            processed: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            flushes: 0,
        }
    }
}

/// Synchronize one entity set from its source into the store
pub trait SyncStrategy {
    fn kind(&self) -> StrategyKind;

    fn commit_scope(&self) -> CommitScope;

    /// Import every record of `source`. Runs inside the caller's transaction.
    fn sync_entity(&self, conn: &Connection, source: &RecordSource) -> Result<EntityReport>;
}

/// Build the strategy for `kind`
pub fn get_strategy(
    kind: StrategyKind,
    capabilities: StoreCapabilities,
    batch_size: usize,
) -> Result<Box<dyn SyncStrategy>> {
    match kind {
        StrategyKind::Bulk => {
            if !capabilities.native_upsert {
                return Err(SyncError::Config(
                    "store has no native upsert; use the cursor strategy".to_string(),
                ));
            }
            Ok(Box::new(BulkUpsert::new(batch_size, capabilities)))
        }
        StrategyKind::Cursor => Ok(Box::new(CursorUpsert::new(batch_size))),
    }
}

/// Parse every line of `source` as `R` and hand it to `f`, in file order
pub(crate) fn for_each_record<R, F>(source: &RecordSource, mut f: F) -> Result<()>
where
    R: EntityRecord,
    F: FnMut(R, &SourceRecord) -> Result<()>,
{
    for record in source.records()? {
        let record = record?;
        let parsed = R::parse(&record, source.path())?;
        f(parsed, &record)?;
    }
    Ok(())
}
