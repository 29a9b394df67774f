// 🚚 Bulk Upsert Strategy
//
// One parameterized upsert per entity kind, executed in batches. Conflict
// resolution is left to the store: on a natural-key conflict every value
// field is rewritten from the incoming row, and the store stamps
// `last_update_date` only when the incoming tuple differs from the stored
// one. No field-level change detection runs on this side.
//
// Assignment and salary ids are resolved by correlated sub-selects inside
// the same statement. A miss yields NULL, which the NOT NULL foreign id
// columns reject.

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::info;

use super::{for_each_record, CommitScope, EntityReport, SyncStrategy};
use crate::batch::BatchWriter;
use crate::config::StrategyKind;
use crate::db::{modification_timestamp, StoreCapabilities};
use crate::error::Result;
use crate::model::{Assignment, Column, Department, Employee, EntityRecord, FieldValue, SalaryRecord};
use crate::resolver::KeyResolver;
use crate::source::{EntityKind, RecordSource};

pub struct BulkUpsert {
    batch_size: usize,
    capabilities: StoreCapabilities,
}

impl BulkUpsert {
    pub fn new(batch_size: usize, capabilities: StoreCapabilities) -> Self {
        BulkUpsert {
            batch_size,
            capabilities,
        }
    }

    fn import<R: BulkRow>(&self, conn: &Connection, source: &RecordSource) -> Result<EntityReport> {
        let inline = self.capabilities.inline_key_resolution;
        let resolver = KeyResolver::new(conn);
        let stamp = modification_timestamp();
        let mut writer = BatchWriter::new(conn, R::KIND, R::upsert_sql(inline), self.batch_size);

        for_each_record::<R, _>(source, |record, _| {
            writer.push(record.bind(inline, &resolver, &stamp)?)
        })?;

        let (processed, flushes) = writer.finish()?;
        info!(entity = %source.kind(), processed, flushes, "finished importing {}", source.path().display());

        Ok(EntityReport {
            processed,
            flushes,
            ..EntityReport::new(R::KIND)
        })
    }
}

impl SyncStrategy for BulkUpsert {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Bulk
    }

    fn commit_scope(&self) -> CommitScope {
        CommitScope::Run
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
// PER-ENTITY STATEMENTS
// ============================================================================

trait BulkRow: EntityRecord {
    /// `inline` selects sub-select key resolution over pre-resolved ids
    fn upsert_sql(inline: bool) -> String;

    fn bind(&self, inline: bool, resolver: &KeyResolver<'_>, stamp: &str) -> Result<Vec<Value>>;
}

/// `DO UPDATE` clause: rewrite every value column, stamp only on difference
fn conflict_update(columns: &[Column], stamp_param: usize) -> String {
    let differs: Vec<String> = columns
        .iter()
        .map(|c| format!("{0} IS NOT excluded.{0}", c.name))
        .collect();
    let assignments: Vec<String> = columns
        .iter()
        .map(|c| format!("{0} = excluded.{0}", c.name))
        .collect();

    format!(
        "DO UPDATE SET last_update_date = CASE WHEN {} THEN ?{} ELSE last_update_date END, {}",
        differs.join(" OR "),
        stamp_param,
        assignments.join(", ")
    )
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn id(resolved: Option<i64>) -> Value {
    resolved.map_or(Value::Null, Value::Integer)
}

fn with_values(mut params: Vec<Value>, values: &[FieldValue], stamp: &str) -> Vec<Value> {
    params.extend(values.iter().map(Value::from));
    params.push(text(stamp));
    params
}

impl BulkRow for Department {
    fn upsert_sql(_inline: bool) -> String {
        "INSERT INTO departments (dept_name) VALUES (?1) ON CONFLICT (dept_name) DO NOTHING".to_string()
    }

    fn bind(&self, _inline: bool, _resolver: &KeyResolver<'_>, _stamp: &str) -> Result<Vec<Value>> {
        Ok(vec![text(&self.name)])
    }
}

impl BulkRow for Employee {
    fn upsert_sql(_inline: bool) -> String {
        format!(
            "INSERT INTO employees (first_name, last_name, birth_date, gender, hire_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (first_name, last_name) {}",
            conflict_update(Self::VALUE_COLUMNS, 6)
        )
    }

    fn bind(&self, _inline: bool, _resolver: &KeyResolver<'_>, stamp: &str) -> Result<Vec<Value>> {
        let key = vec![text(&self.name.first), text(&self.name.last)];
        Ok(with_values(key, &self.values(), stamp))
    }
}

impl BulkRow for Assignment {
    fn upsert_sql(inline: bool) -> String {
        let (ids, rest) = if inline {
            (
                "(SELECT id FROM departments WHERE dept_name = ?1), \
                 (SELECT id FROM employees WHERE first_name = ?2 AND last_name = ?3)",
                4,
            )
        } else {
            ("?1, ?2", 3)
        };
        format!(
            "INSERT INTO dept_emp (dept_id, emp_id, from_date, to_date)
             VALUES ({}, ?{}, ?{})
             ON CONFLICT (dept_id, emp_id) {}",
            ids,
            rest,
            rest + 1,
            conflict_update(Self::VALUE_COLUMNS, rest + 2)
        )
    }

    fn bind(&self, inline: bool, resolver: &KeyResolver<'_>, stamp: &str) -> Result<Vec<Value>> {
        let key = if inline {
            vec![
                text(&self.department),
                text(&self.employee.first),
                text(&self.employee.last),
            ]
        } else {
            vec![
                id(resolver.department_id(&self.department)?),
                id(resolver.employee_id(&self.employee)?),
            ]
        };
        Ok(with_values(key, &self.values(), stamp))
    }
}

impl BulkRow for SalaryRecord {
    fn upsert_sql(inline: bool) -> String {
        let (emp, rest) = if inline {
            ("(SELECT id FROM employees WHERE first_name = ?1 AND last_name = ?2)", 3)
        } else {
            ("?1", 2)
        };
        // from_date is part of the key, so it is bound between salary and to_date
        format!(
            "INSERT INTO emp_salary (emp_id, salary, from_date, to_date)
             VALUES ({}, ?{}, ?{}, ?{})
             ON CONFLICT (emp_id, from_date) {}",
            emp,
            rest,
            rest + 1,
            rest + 2,
            conflict_update(Self::VALUE_COLUMNS, rest + 3)
        )
    }

    fn bind(&self, inline: bool, resolver: &KeyResolver<'_>, stamp: &str) -> Result<Vec<Value>> {
        let mut params = if inline {
            vec![text(&self.employee.first), text(&self.employee.last)]
        } else {
            vec![id(resolver.employee_id(&self.employee)?)]
        };
        params.push(Value::Integer(self.salary));
        params.push(Value::from(&FieldValue::Date(self.from_date)));
        params.push(Value::from(&FieldValue::Date(self.to_date)));
        params.push(text(stamp));
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::count_modified;
    use crate::strategy::test_support::{run, scalar, store};
    use tempfile::tempdir;

    fn bulk() -> BulkUpsert {
        BulkUpsert::new(500, StoreCapabilities::detect())
    }

    fn seed(strategy: &BulkUpsert, conn: &Connection, dir: &tempfile::TempDir) {
        run(strategy, conn, dir, EntityKind::Department, &["Sales", "Finance"]).unwrap();
        run(
            strategy,
            conn,
            dir,
            EntityKind::Employee,
            &["Ada,Lovelace,1960-01-01,F,1990-01-01", "Alan,Turing,1962-06-23,M,1991-03-01"],
        )
        .unwrap();
    }

    #[test]
    fn test_duplicate_department_is_single_row() {
        let conn = store();
        let dir = tempdir().unwrap();

        let report = run(&bulk(), &conn, &dir, EntityKind::Department, &["Sales", "Sales"]).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(scalar::<i64>(&conn, "SELECT COUNT(*) FROM departments"), 1);
        assert_eq!(scalar::<String>(&conn, "SELECT dept_name FROM departments"), "Sales");
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let conn = store();
        let dir = tempdir().unwrap();
        let strategy = bulk();

        seed(&strategy, &conn, &dir);
        seed(&strategy, &conn, &dir);

        assert_eq!(scalar::<i64>(&conn, "SELECT COUNT(*) FROM employees"), 2);
        assert_eq!(count_modified(&conn, EntityKind::Employee).unwrap(), 0);
        assert_eq!(count_modified(&conn, EntityKind::Department).unwrap(), 0);
    }

    #[test]
    fn test_conflict_is_last_write_wins() {
        let conn = store();
        let dir = tempdir().unwrap();

        run(
            &bulk(),
            &conn,
            &dir,
            EntityKind::Employee,
            &["Ada,Lovelace,1960-01-01,F,1990-01-01", "Ada,Lovelace,1961-01-01,F,1990-01-01"],
        )
        .unwrap();

        assert_eq!(scalar::<i64>(&conn, "SELECT COUNT(*) FROM employees"), 1);
        assert_eq!(scalar::<String>(&conn, "SELECT birth_date FROM employees"), "1961-01-01");
        assert_eq!(count_modified(&conn, EntityKind::Employee).unwrap(), 1);
    }

    #[test]
    fn test_assignments_and_salaries_resolve_inline() {
        let conn = store();
        let dir = tempdir().unwrap();
        let strategy = bulk();
        seed(&strategy, &conn, &dir);

        run(&strategy, &conn, &dir, EntityKind::Assignment, &["Finance,Alan,Turing,1991-03-01,9999-01-01"]).unwrap();
        run(
            &strategy,
            &conn,
            &dir,
            EntityKind::Salary,
            &["Alan,Turing,60117,1991-03-01,1992-03-01", "Alan,Turing,62102,1992-03-01,9999-01-01"],
        )
        .unwrap();

        assert_eq!(scalar::<i64>(&conn, "SELECT dept_id FROM dept_emp"), 2);
        assert_eq!(scalar::<i64>(&conn, "SELECT emp_id FROM dept_emp"), 2);
        assert_eq!(scalar::<i64>(&conn, "SELECT COUNT(*) FROM emp_salary WHERE emp_id = 2"), 2);

        run(&strategy, &conn, &dir, EntityKind::Salary, &["Alan,Turing,61000,1991-03-01,1992-03-01"]).unwrap();

        assert_eq!(
            scalar::<i64>(&conn, "SELECT salary FROM emp_salary WHERE from_date = '1991-03-01'"),
            61000
        );
        assert_eq!(count_modified(&conn, EntityKind::Salary).unwrap(), 1);
    }

    #[test]
    fn test_unknown_reference_is_constraint_violation() {
        let conn = store();
        let dir = tempdir().unwrap();

        let err = run(&bulk(), &conn, &dir, EntityKind::Assignment, &["Sales,Ada,Lovelace,1990-01-01,9999-01-01"])
            .unwrap_err();

        assert!(err.is_constraint_violation());
        assert_eq!(scalar::<i64>(&conn, "SELECT COUNT(*) FROM dept_emp"), 0);
    }

    #[test]
    fn test_resolve_then_write_fallback() {
        let conn = store();
        let dir = tempdir().unwrap();
        let strategy = BulkUpsert::new(500, StoreCapabilities::detect().without_inline_resolution());
        seed(&strategy, &conn, &dir);

        run(&strategy, &conn, &dir, EntityKind::Assignment, &["Sales,Ada,Lovelace,1990-01-01,9999-01-01"]).unwrap();
        run(&strategy, &conn, &dir, EntityKind::Salary, &["Ada,Lovelace,50000,1990-01-01,9999-01-01"]).unwrap();

        assert_eq!(scalar::<i64>(&conn, "SELECT dept_id FROM dept_emp"), 1);
        assert_eq!(scalar::<i64>(&conn, "SELECT salary FROM emp_salary"), 50000);

        let err = run(&strategy, &conn, &dir, EntityKind::Salary, &["Grace,Hopper,1,1990-01-01,9999-01-01"])
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_flushes_at_batch_boundaries() {
        for (rows, expected) in [(1000, 2), (999, 2), (1, 1)] {
            let conn = store();
            let dir = tempdir().unwrap();
            let names: Vec<String> = (0..rows).map(|i| format!("Dept {}", i)).collect();
            let lines: Vec<&str> = names.iter().map(String::as_str).collect();

            let report = run(&bulk(), &conn, &dir, EntityKind::Department, &lines).unwrap();

            assert_eq!(report.processed, rows);
            assert_eq!(report.flushes, expected, "{} rows", rows);
            assert_eq!(scalar::<i64>(&conn, "SELECT COUNT(*) FROM departments"), rows as i64);
        }
    }

    #[test]
    fn test_malformed_line_aborts_import() {
        let conn = store();
        let dir = tempdir().unwrap();

        let err = run(&bulk(), &conn, &dir, EntityKind::Employee, &["Ada,Lovelace,not-a-date,F,1990-01-01"])
            .unwrap_err();

        assert!(matches!(err, crate::error::SyncError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_upsert_sql_parameter_layout() {
        let inline = SalaryRecord::upsert_sql(true);
        assert!(inline.contains("VALUES ((SELECT id FROM employees WHERE first_name = ?1 AND last_name = ?2), ?3, ?4, ?5)"));
        assert!(inline.contains("THEN ?6"));

        let plain = Assignment::upsert_sql(false);
        assert!(plain.contains("VALUES (?1, ?2, ?3, ?4)"));
        assert!(plain.contains("THEN ?5"));
    }
}
