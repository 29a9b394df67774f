// 🔍 Change Detector - field-level diff between a stored row and a record
//
// Pure computation: no I/O. Comparison is on the typed domain (date
// equality, exact string equality, integer equality), never on formatting.

use crate::model::{Column, FieldValue};

/// Outcome for a single value field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub column: &'static str,
    pub stored: FieldValue,
    pub candidate: FieldValue,
    pub changed: bool,
}

/// Per-field outcomes plus the aggregated dirty flag
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    pub fields: Vec<FieldDiff>,
    pub dirty: bool,
}

impl ChangeSet {
    /// Only the fields that need writing
    pub fn changed(&self) -> impl Iterator<Item = &FieldDiff> {
        self.fields.iter().filter(|f| f.changed)
    }

    pub fn changed_count(&self) -> usize {
        self.changed().count()
    }

    pub fn is_changed(&self, column: &str) -> bool {
        self.fields.iter().any(|f| f.column == column && f.changed)
    }
}

/// Compare `stored` against `candidate`, column by column.
///
/// Both slices are in `columns` order. A length mismatch is a programming
/// error in the caller, so extra values on either side are ignored.
pub fn detect(columns: &[Column], stored: &[FieldValue], candidate: &[FieldValue]) -> ChangeSet {
    let fields: Vec<FieldDiff> = columns
        .iter()
        .zip(stored.iter().zip(candidate.iter()))
        .map(|(column, (stored, candidate))| FieldDiff {
            column: column.name,
            stored: stored.clone(),
            candidate: candidate.clone(),
            changed: stored != candidate,
        })
        .collect();

    let dirty = fields.iter().any(|f| f.changed);
    ChangeSet { fields, dirty }
}
