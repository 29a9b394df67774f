// 📦 Batch Writer - accumulate parameter sets, execute them per round-trip
//
// A flush runs the whole accumulated batch through one cached prepared
// statement. Flushes happen every `batch_size` records and once more at the
// end for the remainder. Committing is the caller's business.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::error::Result;
use crate::source::EntityKind;

pub struct BatchWriter<'c> {
    conn: &'c Connection,
    kind: EntityKind,
    sql: String,
    batch_size: usize,
    pending: Vec<Vec<Value>>,
    queued: usize,
    flushes: usize,
}

impl<'c> BatchWriter<'c> {
    pub fn new(conn: &'c Connection, kind: EntityKind, sql: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        BatchWriter {
            conn,
            kind,
            sql: sql.into(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            queued: 0,
            flushes: 0,
        }
    }

    /// Queue one parameter set; flushes when the batch is full
    pub fn push(&mut self, params: Vec<Value>) -> Result<()> {
        self.pending.push(params);
        self.queued += 1;
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Execute every pending parameter set. A failing row aborts the batch.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        info!(
            entity = %self.kind,
            rows = self.queued,
            batch = self.pending.len(),
            "processed {} rows: executing batch",
            self.queued
        );

        let mut stmt = self.conn.prepare_cached(&self.sql)?;
        for params in self.pending.drain(..) {
            stmt.execute(params_from_iter(params))?;
        }
        self.flushes += 1;
        Ok(())
    }

    /// Flush the final partial batch and return `(records, flushes)`
    pub fn finish(mut self) -> Result<(usize, usize)> {
        self.flush()?;
        debug!(entity = %self.kind, flushes = self.flushes, "batch writer finished");
        Ok((self.queued, self.flushes))
    }
}
