// ⚠️ Error taxonomy for the synchronization engine
//
// Every variant is fatal for the enclosing unit of work. Nothing is retried
// and nothing is skipped row-by-row.

use std::path::PathBuf;
use thiserror::Error;

use crate::source::EntityKind;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Unparseable date/integer or wrong field count
    #[error("malformed record at {}:{line}: {reason}", .file.display())]
    Malformed {
        file: PathBuf,
        line: u64,
        reason: String,
    },

    /// A natural key referenced by an assignment or salary line has no row yet
    #[error("unresolved {entity} reference '{key}' at {}:{line}", .file.display())]
    UnresolvedReference {
        entity: EntityKind,
        key: String,
        file: PathBuf,
        line: u64,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn malformed(file: impl Into<PathBuf>, line: u64, reason: impl Into<String>) -> Self {
        SyncError::Malformed {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }

    /// True when the store rejected a write because of a constraint
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            SyncError::Store(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message_names_file_and_line() {
        let err = SyncError::malformed("csv/employees.csv", 7, "bad date '1960-13-01'");
        let msg = err.to_string();

        assert!(msg.contains("csv/employees.csv:7"));
        assert!(msg.contains("bad date"));
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_unresolved_reference_message() {
        let err = SyncError::UnresolvedReference {
            entity: EntityKind::Department,
            key: "Sales".to_string(),
            file: PathBuf::from("dept_emp.csv"),
            line: 3,
        };

        assert_eq!(
            err.to_string(),
            "unresolved department reference 'Sales' at dept_emp.csv:3"
        );
    }
}
