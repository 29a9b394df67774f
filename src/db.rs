use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::source::EntityKind;

// ============================================================================
// STORE CAPABILITIES
// ============================================================================

/// What the connected store can do inside a single write statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// `INSERT ... ON CONFLICT DO UPDATE` keyed by a uniqueness constraint
    pub native_upsert: bool,
    /// Correlated sub-selects resolving a natural key to an id inside `VALUES`
    pub inline_key_resolution: bool,
}

impl StoreCapabilities {
    /// Capabilities of the linked SQLite library (upsert needs 3.24+)
    pub fn detect() -> Self {
        StoreCapabilities {
            native_upsert: rusqlite::version_number() >= 3_024_000,
            inline_key_resolution: true,
        }
    }

    /// Force the resolve-then-write fallback
    pub fn without_inline_resolution(mut self) -> Self {
        self.inline_key_resolution = false;
        self
    }
}

/// Value written into `last_update_date` when a row's fields change
pub fn modification_timestamp() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the store at `path` and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "journal mode set");
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Entity tables (surrogate ids)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dept_name TEXT NOT NULL UNIQUE,
            last_update_date TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            gender TEXT NOT NULL,
            hire_date TEXT NOT NULL,
            last_update_date TEXT,
            UNIQUE (first_name, last_name)
        )",
        [],
    )?;

    // ==========================================================================
    // Relationship tables (keyed by resolved ids)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dept_emp (
            dept_id INTEGER NOT NULL REFERENCES departments(id),
            emp_id INTEGER NOT NULL REFERENCES employees(id),
            from_date TEXT NOT NULL,
            to_date TEXT NOT NULL,
            last_update_date TEXT,
            PRIMARY KEY (dept_id, emp_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS emp_salary (
            emp_id INTEGER NOT NULL REFERENCES employees(id),
            salary INTEGER NOT NULL CHECK (salary >= 0),
            from_date TEXT NOT NULL,
            to_date TEXT NOT NULL,
            last_update_date TEXT,
            PRIMARY KEY (emp_id, from_date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_dept_emp_emp ON dept_emp(emp_id)",
        [],
    )?;

    debug!("schema ready");
    Ok(())
}

/// Empty all four tables (children first) and reset id sequences
pub fn truncate_tables(conn: &Connection) -> Result<()> {
    for kind in EntityKind::ALL.iter().rev() {
        info!(table = kind.table(), "truncating");
        conn.execute(&format!("DELETE FROM {}", kind.table()), [])?;
    }
    conn.execute(
        "DELETE FROM sqlite_sequence WHERE name IN ('departments', 'employees')",
        [],
    )?;
    Ok(())
}

pub fn count_rows(conn: &Connection, kind: EntityKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Rows carrying a modification marker
pub fn count_modified(conn: &Connection, kind: EntityKind) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE last_update_date IS NOT NULL",
        kind.table()
    );
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}
