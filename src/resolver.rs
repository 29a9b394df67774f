// 🔑 Key Resolver - natural key -> surrogate id
//
// Used by the cursor strategy for every reference, and by the bulk strategy
// when the store cannot resolve keys inline.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::model::EmployeeName;
use crate::source::EntityKind;

pub struct KeyResolver<'c> {
    conn: &'c Connection,
}

impl<'c> KeyResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        KeyResolver { conn }
    }

    pub fn department_id(&self, name: &str) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM departments WHERE dept_name = ?1")?;
        let id = stmt.query_row(params![name], |row| row.get(0)).optional()?;
        Ok(id)
    }

    pub fn employee_id(&self, name: &EmployeeName) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM employees WHERE first_name = ?1 AND last_name = ?2")?;
        let id = stmt
            .query_row(params![name.first, name.last], |row| row.get(0))
            .optional()?;
        Ok(id)
    }

    /// A miss means the source violates the processing order: fatal for the line
    pub fn require_department(&self, name: &str, file: &Path, line: u64) -> Result<i64> {
        self.department_id(name)?
            .ok_or_else(|| SyncError::UnresolvedReference {
                entity: EntityKind::Department,
                key: name.to_string(),
                file: file.to_path_buf(),
                line,
            })
    }

    pub fn require_employee(&self, name: &EmployeeName, file: &Path, line: u64) -> Result<i64> {
        self.employee_id(name)?
            .ok_or_else(|| SyncError::UnresolvedReference {
                entity: EntityKind::Employee,
                key: name.to_string(),
                file: file.to_path_buf(),
                line,
            })
    }
}
