// 📊 Table statistics - totals and rows bearing a modification marker

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{count_modified, count_rows};
use crate::error::Result;
use crate::source::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub table: String,
    pub total_records: i64,
    pub updated_records: i64,
}

pub fn collect_stats(conn: &Connection) -> Result<Vec<TableStats>> {
    EntityKind::ALL
        .iter()
        .map(|kind| {
            Ok(TableStats {
                table: kind.table().to_string(),
                total_records: count_rows(conn, *kind)?,
                updated_records: count_modified(conn, *kind)?,
            })
        })
        .collect()
}

/// Fixed-width text table, one row per entity table
pub fn render_table(stats: &[TableStats]) -> String {
    let rule = "|-------------|---------------|-----------------|";
    let mut out = String::new();
    out.push_str(rule);
    out.push('\n');
    out.push_str(&format!(
        "| {:<11} | {:<13} | {:<15} |\n",
        "table", "total records", "updated records"
    ));
    out.push_str(rule);
    out.push('\n');
    for s in stats {
        out.push_str(&format!(
            "| {:<11} | {:<13} | {:<15} |\n",
            s.table, s.total_records, s.updated_records
        ));
        out.push_str(rule);
        out.push('\n');
    }
    out
}
