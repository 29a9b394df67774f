// 🎯 Cursor Upsert Strategy
//
// Per record:
//   1. resolve referenced ids explicitly (a miss is fatal)
//   2. position on the stored row by natural key
//   3. row found   -> run the change detector, write only changed fields
//                     plus a fresh `last_update_date`
//      row missing -> insert with all value fields, no marker
//
// Each entity import is its own unit of work (see `CommitScope::Entity`).

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{for_each_record, CommitScope, EntityReport, SyncStrategy};
use crate::config::StrategyKind;
use crate::db::modification_timestamp;
use crate::detector::{self, ChangeSet};
use crate::error::Result;
use crate::model::{Assignment, Column, Department, Employee, EntityRecord, FieldValue, SalaryRecord};
use crate::progress::Progress;
use crate::resolver::KeyResolver;
use crate::source::{EntityKind, RecordSource, SourceRecord};

pub struct CursorUpsert {
    progress_step: usize,
}

impl CursorUpsert {
    pub fn new(progress_step: usize) -> Self {
        CursorUpsert { progress_step }
    }

    fn import<R: CursorRow>(&self, conn: &Connection, source: &RecordSource) -> Result<EntityReport> {
        let resolver = KeyResolver::new(conn);
        let cursor = RowCursor::new(conn, R::KIND.table(), R::KEY_COLUMNS, R::VALUE_COLUMNS);
        let mut progress = Progress::new(R::KIND, self.progress_step);
        let mut report = EntityReport::new(R::KIND);

        for_each_record::<R, _>(source, |record, line| {
            let key = record.key(&resolver, source, line)?;
            let candidate = record.values();

            match cursor.fetch(&key)? {
                Some(stored) => {
                    let changes = detector::detect(R::VALUE_COLUMNS, &stored.values, &candidate);
                    if changes.dirty {
                        cursor.update_changed(stored.rowid, &changes, &modification_timestamp())?;
                        report.updated += 1;
                    } else {
                        report.unchanged += 1;
                    }
                }
                None => {
                    cursor.insert(&key, &candidate)?;
                    report.inserted += 1;
                }
            }

            progress.record();
            Ok(())
        })?;

        report.processed = progress.finish();
        report.flushes = progress.reports();
        info!(
            entity = %source.kind(),
            processed = report.processed,
            inserted = report.inserted,
            updated = report.updated,
            "finished importing {}",
            source.path().display()
        );
        Ok(report)
    }
}

impl SyncStrategy for CursorUpsert {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cursor
    }

    fn commit_scope(&self) -> CommitScope {
        CommitScope::Entity
    }

    fn sync_entity(&self, conn: &Connection, source: &RecordSource) -> Result<EntityReport> {
        match source.kind() {
            EntityKind::Department => self.import::<Department>(conn, source),
            EntityKind::Employee => self.import::<Employee>(conn, source),
            EntityKind::Assignment => self.import::<Assignment>(conn, source),
            EntityKind::Salary => self.import::<SalaryRecord>(conn, source),
        }
    }
}

// ============================================================================
// NATURAL KEYS WITH RESOLVED REFERENCES
// ============================================================================

trait CursorRow: EntityRecord {
    /// Natural key columns of the target table, in `key()` order
    const KEY_COLUMNS: &'static [&'static str];

    /// Key values with every reference resolved to its surrogate id
    fn key(&self, resolver: &KeyResolver<'_>, source: &RecordSource, line: &SourceRecord) -> Result<Vec<Value>>;
}

impl CursorRow for Department {
    const KEY_COLUMNS: &'static [&'static str] = &["dept_name"];

    fn key(&self, _: &KeyResolver<'_>, _: &RecordSource, _: &SourceRecord) -> Result<Vec<Value>> {
        Ok(vec![Value::Text(self.name.clone())])
    }
}

impl CursorRow for Employee {
    const KEY_COLUMNS: &'static [&'static str] = &["first_name", "last_name"];

    fn key(&self, _: &KeyResolver<'_>, _: &RecordSource, _: &SourceRecord) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.name.first.clone()),
            Value::Text(self.name.last.clone()),
        ])
    }
}

impl CursorRow for Assignment {
    const KEY_COLUMNS: &'static [&'static str] = &["dept_id", "emp_id"];

    fn key(&self, resolver: &KeyResolver<'_>, source: &RecordSource, line: &SourceRecord) -> Result<Vec<Value>> {
        let dept_id = resolver.require_department(&self.department, source.path(), line.line)?;
        let emp_id = resolver.require_employee(&self.employee, source.path(), line.line)?;
        Ok(vec![Value::Integer(dept_id), Value::Integer(emp_id)])
    }
}

impl CursorRow for SalaryRecord {
    const KEY_COLUMNS: &'static [&'static str] = &["emp_id", "from_date"];

    fn key(&self, resolver: &KeyResolver<'_>, source: &RecordSource, line: &SourceRecord) -> Result<Vec<Value>> {
        let emp_id = resolver.require_employee(&self.employee, source.path(), line.line)?;
        Ok(vec![
            Value::Integer(emp_id),
            Value::from(&FieldValue::Date(self.from_date)),
        ])
    }
}

// ============================================================================
// ROW CURSOR
// ============================================================================

/// Current values of a stored row, addressed by rowid for positioned updates
#[derive(Debug)]
struct StoredRow {
    rowid: i64,
    values: Vec<FieldValue>,
}

struct RowCursor<'c> {
    conn: &'c Connection,
    table: &'static str,
    key_columns: &'static [&'static str],
    value_columns: &'static [Column],
    select_sql: String,
    insert_sql: String,
}

impl<'c> RowCursor<'c> {
    fn new(
        conn: &'c Connection,
        table: &'static str,
        key_columns: &'static [&'static str],
        value_columns: &'static [Column],
    ) -> Self {
        let selected: Vec<&str> = std::iter::once("rowid")
            .chain(value_columns.iter().map(|c| c.name))
            .collect();
        let filter: Vec<String> = key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 1))
            .collect();
        let select_sql = format!(
            "SELECT {} FROM {} WHERE {}",
            selected.join(", "),
            table,
            filter.join(" AND ")
        );

        let columns: Vec<&str> = key_columns
            .iter()
            .copied()
            .chain(value_columns.iter().map(|c| c.name))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        RowCursor {
            conn,
            table,
            key_columns,
            value_columns,
            select_sql,
            insert_sql,
        }
    }

    fn fetch(&self, key: &[Value]) -> Result<Option<StoredRow>> {
        let mut stmt = self.conn.prepare_cached(&self.select_sql)?;
        let row = stmt
            .query_row(params_from_iter(key.iter()), |row| {
                let rowid: i64 = row.get(0)?;
                let values = self
                    .value_columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c.field_type.read(row, i + 1))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(StoredRow { rowid, values })
            })
            .optional()?;
        Ok(row)
    }

    /// Overwrite only the changed fields and stamp the row
    fn update_changed(&self, rowid: i64, changes: &ChangeSet, stamp: &str) -> Result<()> {
        let mut assignments = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        for diff in changes.changed() {
            params.push(Value::from(&diff.candidate));
            assignments.push(format!("{} = ?{}", diff.column, params.len()));
        }
        params.push(Value::Text(stamp.to_string()));
        assignments.push(format!("last_update_date = ?{}", params.len()));
        params.push(Value::Integer(rowid));

        let sql = format!(
            "UPDATE {} SET {} WHERE rowid = ?{}",
            self.table,
            assignments.join(", "),
            params.len()
        );
        debug!(table = self.table, rowid, fields = changes.changed_count(), "updating row");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(params))?;
        Ok(())
    }

    fn insert(&self, key: &[Value], values: &[FieldValue]) -> Result<()> {
        debug_assert_eq!(key.len(), self.key_columns.len());
        let params = key
            .iter()
            .cloned()
            .chain(values.iter().map(Value::from));

        let mut stmt = self.conn.prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(params))?;
        Ok(())
    }
}
