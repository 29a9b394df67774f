// 🧱 Entity Records - typed views of source lines
//
// Each record knows its natural key and its value fields. Value fields are
// exposed as `FieldValue`s in table column order so both strategies and the
// change detector work over the same typed domain.

use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::Row;
use std::fmt;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::source::{EntityKind, SourceRecord};

// ============================================================================
// TYPED FIELD VALUES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Date,
    Text,
}

impl FieldType {
    /// Read column `idx` of a stored row as this type
    pub fn read(&self, row: &Row<'_>, idx: usize) -> rusqlite::Result<FieldValue> {
        Ok(match self {
            FieldType::Int => FieldValue::Int(row.get(idx)?),
            FieldType::Date => FieldValue::Date(row.get(idx)?),
            FieldType::Text => FieldValue::Text(row.get(idx)?),
        })
    }
}

/// A value field, compared by value on its typed domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::Text(_) => FieldType::Text,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(n) => write!(f, "{}", n),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            FieldValue::Int(n) => n.to_sql(),
            FieldValue::Date(d) => d.to_sql(),
            FieldValue::Text(s) => s.to_sql(),
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Int(n) => Value::Integer(*n),
            FieldValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
            FieldValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// A named value column of a target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub field_type: FieldType,
}

const fn column(name: &'static str, field_type: FieldType) -> Column {
    Column { name, field_type }
}

// ============================================================================
// NATURAL KEYS
// ============================================================================

/// Natural key of an employee
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmployeeName {
    pub first: String,
    pub last: String,
}

impl EmployeeName {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        EmployeeName {
            first: first.into(),
            last: last.into(),
        }
    }
}

impl fmt::Display for EmployeeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first, self.last)
    }
}

// ============================================================================
// RECORD TRAIT
// ============================================================================

/// A typed source record of one entity kind
pub trait EntityRecord: Sized {
    const KIND: EntityKind;

    /// Value columns, in the order `values()` returns them
    const VALUE_COLUMNS: &'static [Column];

    /// Convert a raw line; any malformed field fails the whole line
    fn parse(record: &SourceRecord, file: &Path) -> Result<Self>;

    fn values(&self) -> Vec<FieldValue>;
}

/// Positional field access with file/line context for errors
struct Fields<'a> {
    record: &'a SourceRecord,
    file: &'a Path,
}

impl<'a> Fields<'a> {
    fn new(kind: EntityKind, record: &'a SourceRecord, file: &'a Path) -> Result<Self> {
        if record.fields.len() != kind.arity() {
            return Err(SyncError::malformed(
                file,
                record.line,
                format!(
                    "expected {} fields for {}, found {}",
                    kind.arity(),
                    kind,
                    record.fields.len()
                ),
            ));
        }
        Ok(Fields { record, file })
    }

    fn text(&self, idx: usize) -> String {
        self.record.fields[idx].clone()
    }

    fn date(&self, idx: usize, name: &str) -> Result<NaiveDate> {
        let raw = &self.record.fields[idx];
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
            SyncError::malformed(
                self.file,
                self.record.line,
                format!("{} '{}' is not an ISO-8601 date: {}", name, raw, e),
            )
        })
    }

    fn amount(&self, idx: usize, name: &str) -> Result<i64> {
        let raw = &self.record.fields[idx];
        match raw.parse::<i64>() {
            Ok(n) if n >= 0 => Ok(n),
            Ok(n) => Err(SyncError::malformed(
                self.file,
                self.record.line,
                format!("{} {} is negative", name, n),
            )),
            Err(e) => Err(SyncError::malformed(
                self.file,
                self.record.line,
                format!("{} '{}' is not an integer: {}", name, raw, e),
            )),
        }
    }
}

// ============================================================================
// DEPARTMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub name: String,
}

impl EntityRecord for Department {
    const KIND: EntityKind = EntityKind::Department;
    const VALUE_COLUMNS: &'static [Column] = &[];

    fn parse(record: &SourceRecord, file: &Path) -> Result<Self> {
        let fields = Fields::new(Self::KIND, record, file)?;
        Ok(Department { name: fields.text(0) })
    }

    fn values(&self) -> Vec<FieldValue> {
        Vec::new()
    }
}

// ============================================================================
// EMPLOYEE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub name: EmployeeName,
    pub birth_date: NaiveDate,
    pub gender: String,
    pub hire_date: NaiveDate,
}

impl EntityRecord for Employee {
    const KIND: EntityKind = EntityKind::Employee;
    const VALUE_COLUMNS: &'static [Column] = &[
        column("birth_date", FieldType::Date),
        column("gender", FieldType::Text),
        column("hire_date", FieldType::Date),
    ];

    fn parse(record: &SourceRecord, file: &Path) -> Result<Self> {
        let fields = Fields::new(Self::KIND, record, file)?;
        Ok(Employee {
            name: EmployeeName::new(fields.text(0), fields.text(1)),
            birth_date: fields.date(2, "birth date")?,
            gender: fields.text(3),
            hire_date: fields.date(4, "hire date")?,
        })
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Date(self.birth_date),
            FieldValue::Text(self.gender.clone()),
            FieldValue::Date(self.hire_date),
        ]
    }
}

// ============================================================================
// ASSIGNMENT (department <-> employee)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub department: String,
    pub employee: EmployeeName,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl EntityRecord for Assignment {
    const KIND: EntityKind = EntityKind::Assignment;
    const VALUE_COLUMNS: &'static [Column] = &[
        column("from_date", FieldType::Date),
        column("to_date", FieldType::Date),
    ];

    fn parse(record: &SourceRecord, file: &Path) -> Result<Self> {
        let fields = Fields::new(Self::KIND, record, file)?;
        Ok(Assignment {
            department: fields.text(0),
            employee: EmployeeName::new(fields.text(1), fields.text(2)),
            from_date: fields.date(3, "from date")?,
            to_date: fields.date(4, "to date")?,
        })
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![FieldValue::Date(self.from_date), FieldValue::Date(self.to_date)]
    }
}

// ============================================================================
// SALARY RECORD
// ============================================================================

/// Natural key is (employee, from_date); from_date is therefore not a value field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryRecord {
    pub employee: EmployeeName,
    pub salary: i64,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl EntityRecord for SalaryRecord {
    const KIND: EntityKind = EntityKind::Salary;
    const VALUE_COLUMNS: &'static [Column] = &[
        column("salary", FieldType::Int),
        column("to_date", FieldType::Date),
    ];

    fn parse(record: &SourceRecord, file: &Path) -> Result<Self> {
        let fields = Fields::new(Self::KIND, record, file)?;
        Ok(SalaryRecord {
            employee: EmployeeName::new(fields.text(0), fields.text(1)),
            salary: fields.amount(2, "salary")?,
            from_date: fields.date(3, "from date")?,
            to_date: fields.date(4, "to date")?,
        })
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![FieldValue::Int(self.salary), FieldValue::Date(self.to_date)]
    }
}
