// 🔄 Synchronization Driver
//
// Runs the four entity imports strictly in dependency order:
//   departments -> employees -> assignments -> salaries
// and stops at the first error.
//
// Partial state after a failure depends on the strategy:
// - bulk:   one transaction for the whole run, truncate included; nothing
//           is kept
// - cursor: the truncate, then one transaction per entity; earlier
//           entities stay committed

use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{StrategyKind, SyncConfig};
use crate::db::{truncate_tables, StoreCapabilities};
use crate::error::Result;
use crate::stats::{collect_stats, TableStats};
use crate::strategy::{get_strategy, CommitScope, EntityReport, SyncStrategy};
use crate::source::{EntityKind, RecordSource};

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub strategy: StrategyKind,
    pub entities: Vec<EntityReport>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<TableStats>>,
}

impl RunReport {
    pub fn total_processed(&self) -> usize {
        self.entities.iter().map(|e| e.processed).sum()
    }

    /// Rows per second over the whole run
    pub fn throughput(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return self.total_processed() as f64;
        }
        self.total_processed() as f64 * 1000.0 / self.elapsed_ms as f64
    }
}

pub struct Synchronizer {
    source_dir: PathBuf,
    strategy: Box<dyn SyncStrategy>,
    truncate: bool,
    report_stats: bool,
}

impl Synchronizer {
    /// Build a synchronizer with the strategy selected in `config`
    pub fn new(config: &SyncConfig) -> Result<Self> {
        config.validate()?;

        let mut capabilities = StoreCapabilities::detect();
        if !config.inline_key_resolution {
            capabilities = capabilities.without_inline_resolution();
        }
        let strategy = get_strategy(config.strategy, capabilities, config.batch_size)?;

        Ok(Self::with_strategy(config, strategy))
    }

    pub fn with_strategy(config: &SyncConfig, strategy: Box<dyn SyncStrategy>) -> Self {
        Synchronizer {
            source_dir: config.source_dir.clone(),
            strategy,
            truncate: config.truncate,
            report_stats: config.report_stats,
        }
    }

    pub fn run(&self, conn: &mut Connection) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, strategy = %self.strategy.kind());
        let _guard = span.enter();

        info!(source_dir = %self.source_dir.display(), "starting synchronization");
        let started = Instant::now();

        let sources: Vec<RecordSource> = EntityKind::ALL
            .iter()
            .map(|kind| RecordSource::in_dir(*kind, &self.source_dir))
            .collect();

        let entities = match self.strategy.commit_scope() {
            CommitScope::Run => self.run_single_transaction(conn, &sources)?,
            CommitScope::Entity => self.run_per_entity(conn, &sources)?,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let stats = if self.report_stats {
            Some(collect_stats(conn)?)
        } else {
            None
        };

        let report = RunReport {
            run_id,
            strategy: self.strategy.kind(),
            entities,
            elapsed_ms,
            stats,
        };
        info!(
            rows = report.total_processed(),
            elapsed_ms,
            rows_per_sec = report.throughput() as u64,
            "synchronization finished"
        );
        Ok(report)
    }

    /// All-or-nothing: dropping the transaction on error rolls everything back,
    /// the truncate included
    fn run_single_transaction(&self, conn: &mut Connection, sources: &[RecordSource]) -> Result<Vec<EntityReport>> {
        let tx = conn.transaction()?;
        if self.truncate {
            truncate_tables(&tx)?;
        }
        let mut reports = Vec::with_capacity(sources.len());

        for source in sources {
            info!("importing {}", source.path().display());
            match self.strategy.sync_entity(&tx, source) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(entity = %source.kind(), error = %e, "import failed, rolling back the whole run");
                    return Err(e);
                }
            }
        }

        tx.commit()?;
        Ok(reports)
    }

    /// Each entity commits on success; a failure keeps what came before it.
    /// The truncate is a unit of work of its own and commits first.
    fn run_per_entity(&self, conn: &mut Connection, sources: &[RecordSource]) -> Result<Vec<EntityReport>> {
        if self.truncate {
            let tx = conn.transaction()?;
            truncate_tables(&tx)?;
            tx.commit()?;
        }
        let mut reports: Vec<EntityReport> = Vec::with_capacity(sources.len());

        for source in sources {
            info!("importing {}", source.path().display());
            let tx = conn.transaction()?;
            match self.strategy.sync_entity(&tx, source) {
                Ok(report) => {
                    tx.commit()?;
                    reports.push(report);
                }
                Err(e) => {
                    let committed: Vec<&str> = reports.iter().map(|r| r.kind.name()).collect();
                    error!(entity = %source.kind(), error = %e, "import failed, rolling back this entity");
                    if !committed.is_empty() {
                        warn!(committed = ?committed, "earlier entity imports remain committed");
                    }
                    return Err(e);
                }
            }
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_modified, count_rows, setup_database};
    use crate::error::SyncError;
    use tempfile::{tempdir, TempDir};

    const DEPARTMENTS: &str = "# departments\nSales\nDevelopment\nSales\n";
    const EMPLOYEES: &str = "Ada,Lovelace,1960-01-01,F,1990-01-01\nAlan,Turing,1962-06-23,M,1991-03-01\n";
    const DEPT_EMP: &str = "Sales,Ada,Lovelace,1990-01-01,9999-01-01\nDevelopment,Alan,Turing,1991-03-01,9999-01-01\n";
    const EMP_SALARY: &str = "Ada,Lovelace,60117,1990-01-01,1991-01-01\nAda,Lovelace,62102,1991-01-01,9999-01-01\nAlan,Turing,66074,1991-03-01,9999-01-01\n";

    fn write_sources(dir: &TempDir, employees: &str, salaries: &str) {
        std::fs::write(dir.path().join("departments.csv"), DEPARTMENTS).unwrap();
        std::fs::write(dir.path().join("employees.csv"), employees).unwrap();
        std::fs::write(dir.path().join("dept_emp.csv"), DEPT_EMP).unwrap();
        std::fs::write(dir.path().join("emp_salary.csv"), salaries).unwrap();
    }

    fn dataset() -> TempDir {
        let dir = tempdir().unwrap();
        write_sources(&dir, EMPLOYEES, EMP_SALARY);
        dir
    }

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn synchronizer(dir: &TempDir, strategy: StrategyKind) -> Synchronizer {
        let config = SyncConfig::new(dir.path(), ":memory:").with_strategy(strategy);
        Synchronizer::new(&config).unwrap()
    }

    fn totals(conn: &Connection) -> Vec<(i64, i64)> {
        EntityKind::ALL
            .iter()
            .map(|k| (count_rows(conn, *k).unwrap(), count_modified(conn, *k).unwrap()))
            .collect()
    }

    #[test]
    fn test_full_run_both_strategies() {
        for strategy in [StrategyKind::Bulk, StrategyKind::Cursor] {
            let dir = dataset();
            let mut conn = store();

            let report = synchronizer(&dir, strategy).run(&mut conn).unwrap();

            assert_eq!(report.strategy, strategy);
            assert_eq!(report.total_processed(), 3 + 2 + 2 + 3);
            assert_eq!(
                report.entities.iter().map(|e| e.kind).collect::<Vec<_>>(),
                EntityKind::ALL.to_vec()
            );
            assert_eq!(totals(&conn), vec![(2, 0), (2, 0), (2, 0), (3, 0)], "{}", strategy);

            let stats = report.stats.unwrap();
            assert_eq!(stats[1].total_records, 2);
        }
    }

    #[test]
    fn test_rerun_is_idempotent() {
        for strategy in [StrategyKind::Bulk, StrategyKind::Cursor] {
            let dir = dataset();
            let mut conn = store();
            let sync = synchronizer(&dir, strategy);

            sync.run(&mut conn).unwrap();
            let first = totals(&conn);
            sync.run(&mut conn).unwrap();

            assert_eq!(totals(&conn), first, "{}", strategy);
            assert!(totals(&conn).iter().all(|(_, modified)| *modified == 0));
        }
    }

    #[test]
    fn test_changed_record_is_marked() {
        for strategy in [StrategyKind::Bulk, StrategyKind::Cursor] {
            let dir = dataset();
            let mut conn = store();
            let sync = synchronizer(&dir, strategy);
            sync.run(&mut conn).unwrap();

            write_sources(
                &dir,
                "Ada,Lovelace,1961-01-01,F,1990-01-01\nAlan,Turing,1962-06-23,M,1991-03-01\n",
                EMP_SALARY,
            );
            sync.run(&mut conn).unwrap();

            let birth: String = conn
                .query_row("SELECT birth_date FROM employees WHERE first_name = 'Ada'", [], |r| r.get(0))
                .unwrap();
            assert_eq!(birth, "1961-01-01");
            assert_eq!(count_modified(&conn, EntityKind::Employee).unwrap(), 1, "{}", strategy);
            assert_eq!(count_rows(&conn, EntityKind::Employee).unwrap(), 2);
        }
    }

    #[test]
    fn test_bulk_failure_rolls_back_everything() {
        let dir = tempdir().unwrap();
        write_sources(&dir, EMPLOYEES, "Ada,Lovelace,lots,1990-01-01,1991-01-01\n");
        let mut conn = store();

        let err = synchronizer(&dir, StrategyKind::Bulk).run(&mut conn).unwrap_err();

        assert!(matches!(err, SyncError::Malformed { .. }));
        assert_eq!(totals(&conn), vec![(0, 0); 4]);
    }

    #[test]
    fn test_cursor_failure_keeps_earlier_entities() {
        let dir = tempdir().unwrap();
        write_sources(&dir, EMPLOYEES, "Grace,Hopper,70000,1990-01-01,9999-01-01\n");
        let mut conn = store();

        let err = synchronizer(&dir, StrategyKind::Cursor).run(&mut conn).unwrap_err();

        assert!(matches!(err, SyncError::UnresolvedReference { entity: EntityKind::Employee, .. }));
        assert_eq!(count_rows(&conn, EntityKind::Department).unwrap(), 2);
        assert_eq!(count_rows(&conn, EntityKind::Employee).unwrap(), 2);
        assert_eq!(count_rows(&conn, EntityKind::Assignment).unwrap(), 2);
        assert_eq!(count_rows(&conn, EntityKind::Salary).unwrap(), 0);
    }

    #[test]
    fn test_truncate_before_run() {
        let dir = dataset();
        let mut conn = store();
        conn.execute("INSERT INTO departments (dept_name) VALUES ('Obsolete')", []).unwrap();

        let mut config = SyncConfig::new(dir.path(), ":memory:").with_strategy(StrategyKind::Cursor);
        config.truncate = true;
        Synchronizer::new(&config).unwrap().run(&mut conn).unwrap();

        assert_eq!(count_rows(&conn, EntityKind::Department).unwrap(), 2);
    }

    #[test]
    fn test_failed_bulk_truncate_run_keeps_previous_data() {
        let dir = dataset();
        let mut conn = store();
        synchronizer(&dir, StrategyKind::Bulk).run(&mut conn).unwrap();
        let before = totals(&conn);

        write_sources(&dir, EMPLOYEES, "Ada,Lovelace,lots,1990-01-01,1991-01-01\n");
        let mut config = SyncConfig::new(dir.path(), ":memory:").with_strategy(StrategyKind::Bulk);
        config.truncate = true;
        let err = Synchronizer::new(&config).unwrap().run(&mut conn).unwrap_err();

        assert!(matches!(err, SyncError::Malformed { .. }));
        assert_eq!(totals(&conn), before);
    }

    #[test]
    fn test_failed_cursor_truncate_run_keeps_truncate() {
        let dir = dataset();
        let mut conn = store();
        synchronizer(&dir, StrategyKind::Cursor).run(&mut conn).unwrap();

        write_sources(&dir, EMPLOYEES, "Ada,Lovelace,lots,1990-01-01,1991-01-01\n");
        let mut config = SyncConfig::new(dir.path(), ":memory:").with_strategy(StrategyKind::Cursor);
        config.truncate = true;
        let err = Synchronizer::new(&config).unwrap().run(&mut conn).unwrap_err();

        assert!(matches!(err, SyncError::Malformed { .. }));

        // truncate and the first three entities committed, salaries rolled back
        assert_eq!(totals(&conn), vec![(2, 0), (2, 0), (2, 0), (0, 0)]);
    }

    #[test]
    fn test_blank_line_aborts_with_line_number() {
        let dir = tempdir().unwrap();
        write_sources(
            &dir,
            "# employees\nAda,Lovelace,1960-01-01,F,1990-01-01\n\nAlan,Turing,1962-06-23,M,1991-03-01\n",
            EMP_SALARY,
        );
        let mut conn = store();

        let err = synchronizer(&dir, StrategyKind::Cursor).run(&mut conn).unwrap_err();

        match err {
            SyncError::Malformed { file, line, .. } => {
                assert!(file.ends_with("employees.csv"));
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(count_rows(&conn, EntityKind::Employee).unwrap(), 0);
    }

    #[test]
    fn test_missing_source_file_aborts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("departments.csv"), DEPARTMENTS).unwrap();
        let mut conn = store();

        let err = synchronizer(&dir, StrategyKind::Bulk).run(&mut conn).unwrap_err();

        assert!(matches!(err, SyncError::Io { .. }));
        assert_eq!(count_rows(&conn, EntityKind::Department).unwrap(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = dataset();
        let config = SyncConfig::new(dir.path(), ":memory:").with_batch_size(0);

        assert!(Synchronizer::new(&config).is_err());
    }
}
