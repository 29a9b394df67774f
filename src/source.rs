// 📂 Record Source - one CSV file per entity kind
//
// Lines are split on ',' with no quoting and no trimming. Lines starting
// with '#' are skipped; blank lines are rejected. Type conversion happens
// later, in `model`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

pub const DELIMITER: u8 = b',';
pub const COMMENT_MARKER: u8 = b'#';

// ============================================================================
// ENTITY KIND
// ============================================================================

/// The four synchronized entity kinds, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Employee,
    Assignment,
    Salary,
}

impl EntityKind {
    /// Processing order: assignments and salaries reference the first two
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Department,
        EntityKind::Employee,
        EntityKind::Assignment,
        EntityKind::Salary,
    ];

    /// Source file name inside the source directory
    pub fn file_name(&self) -> &'static str {
        match self {
            EntityKind::Department => "departments.csv",
            EntityKind::Employee => "employees.csv",
            EntityKind::Assignment => "dept_emp.csv",
            EntityKind::Salary => "emp_salary.csv",
        }
    }

    /// Target table
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Department => "departments",
            EntityKind::Employee => "employees",
            EntityKind::Assignment => "dept_emp",
            EntityKind::Salary => "emp_salary",
        }
    }

    /// Number of positional fields per line
    pub fn arity(&self) -> usize {
        match self {
            EntityKind::Department => 1,
            EntityKind::Employee => 5,
            EntityKind::Assignment => 5,
            EntityKind::Salary => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Department => "department",
            EntityKind::Employee => "employee",
            EntityKind::Assignment => "assignment",
            EntityKind::Salary => "salary",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SOURCE RECORD
// ============================================================================

/// One non-comment line, split into raw string fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// 1-based physical line number in the file
    pub line: u64,
    pub fields: Vec<String>,
}

// ============================================================================
// RECORD SOURCE
// ============================================================================

/// A restartable source: every call to `records()` reopens the file
#[derive(Debug, Clone)]
pub struct RecordSource {
    kind: EntityKind,
    path: PathBuf,
}

impl RecordSource {
    pub fn new(kind: EntityKind, path: impl Into<PathBuf>) -> Self {
        RecordSource {
            kind,
            path: path.into(),
        }
    }

    /// Source for `kind` at its fixed file name under `dir`
    pub fn in_dir(kind: EntityKind, dir: &Path) -> Self {
        RecordSource::new(kind, dir.join(kind.file_name()))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh lazy pass over the file
    pub fn records(&self) -> Result<Records<File>> {
        let file = File::open(&self.path).map_err(|source| SyncError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(Records::from_reader(file, &self.path))
    }
}

/// Lazy iterator over the non-comment lines of one input
///
/// Line numbers are physical: comment lines count. The tokenizer swallows
/// empty lines, so every read is measured by how many newlines it consumed;
/// anything beyond the record's own terminator is a blank line, and a blank
/// line is malformed input.
pub struct Records<R: Read> {
    inner: csv::StringRecordsIntoIter<LineTerminated<R>>,
    path: PathBuf,
    line: u64,
}

impl<R: Read> Records<R> {
    /// `path` is only used to label errors
    pub fn from_reader(reader: R, path: impl Into<PathBuf>) -> Self {
        // Comments are recognized here rather than by the tokenizer, which
        // would consume them without a trace
        let inner = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(DELIMITER)
            .terminator(csv::Terminator::Any(b'\n'))
            .comment(None)
            .quoting(false)
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(LineTerminated::new(reader))
            .into_records();

        Records {
            inner,
            path: path.into(),
            line: 1,
        }
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.line;
            let next = self.inner.next();
            self.line = self.inner.reader().position().line();

            let consumed = self.line - start;
            let own_terminator = u64::from(next.is_some());
            if consumed > own_terminator {
                return Some(Err(SyncError::malformed(&self.path, start, "blank line")));
            }

            let record = match next? {
                Ok(record) => record,
                Err(source) => {
                    return Some(Err(SyncError::Csv {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            if is_comment(&record) {
                continue;
            }

            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
            if let Some(last) = fields.last_mut() {
                if last.ends_with('\r') {
                    last.pop();
                }
            }
            return Some(Ok(SourceRecord { line: start, fields }));
        }
    }
}

fn is_comment(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .map_or(false, |first| first.as_bytes().first() == Some(&COMMENT_MARKER))
}

/// Appends a final '\n' when the input does not end with one, so that every
/// record, the last included, consumes exactly one terminator
struct LineTerminated<R> {
    inner: R,
    last: Option<u8>,
    done: bool,
}

impl<R: Read> LineTerminated<R> {
    fn new(inner: R) -> Self {
        LineTerminated {
            inner,
            last: None,
            done: false,
        }
    }
}

impl<R: Read> Read for LineTerminated<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.last = Some(buf[n - 1]);
            return Ok(n);
        }

        self.done = true;
        match self.last {
            Some(b) if b != b'\n' => {
                buf[0] = b'\n';
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}
