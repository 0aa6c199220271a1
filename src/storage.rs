use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;

use crate::models::{RowBatch, RunLogRow, RunOutcome, SourceTable};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file}: {message}")]
    Parse { file: String, message: String },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("database error: {0}")]
    Database(String),
}

/// Warehouse the pipeline writes into. One backend instance serves a whole
/// run; every method uses the same underlying connection.
pub trait Storage {
    /// Creates schemas and tables if they do not exist yet. Safe to call on
    /// every run.
    fn init_schema(&mut self) -> Result<(), LoadError>;

    /// Atomically replaces the table contents with the batch and returns the
    /// number of rows written. On error the previous contents remain.
    fn replace_rows(&mut self, batch: &RowBatch) -> Result<u64, LoadError>;

    /// Opens the audit row for a table load and returns its id.
    fn begin_run_log(
        &mut self,
        table: SourceTable,
        started_at: OffsetDateTime,
    ) -> Result<i64, LoadError>;

    /// Finalizes an audit row. Each row is finalized at most once.
    fn finish_run_log(&mut self, log_id: i64, outcome: &RunOutcome) -> Result<(), LoadError>;
}

/// Storage backend holding everything in process memory. Used by tests.
#[derive(Debug)]
pub struct MemoryStorage {
    tables: BTreeMap<SourceTable, RowBatch>,
    run_logs: Vec<RunLogRow>,
    next_log_id: i64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            run_logs: Vec::new(),
            next_log_id: 1,
        }
    }

    pub fn batch(&self, table: SourceTable) -> Option<&RowBatch> {
        self.tables.get(&table)
    }

    pub fn row_count(&self, table: SourceTable) -> usize {
        self.tables.get(&table).map_or(0, |batch| batch.len())
    }

    pub fn run_logs(&self) -> &[RunLogRow] {
        &self.run_logs
    }

    pub fn logs_for(&self, table: SourceTable) -> Vec<&RunLogRow> {
        self.run_logs
            .iter()
            .filter(|log| log.table_name == table.qualified_name())
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn init_schema(&mut self) -> Result<(), LoadError> {
        Ok(())
    }

    fn replace_rows(&mut self, batch: &RowBatch) -> Result<u64, LoadError> {
        let written = batch.len() as u64;
        self.tables.insert(batch.table(), batch.clone());
        Ok(written)
    }

    fn begin_run_log(
        &mut self,
        table: SourceTable,
        started_at: OffsetDateTime,
    ) -> Result<i64, LoadError> {
        let log_id = self.next_log_id;
        self.next_log_id += 1;
        self.run_logs.push(RunLogRow::started(log_id, table, started_at));
        Ok(log_id)
    }

    fn finish_run_log(&mut self, log_id: i64, outcome: &RunOutcome) -> Result<(), LoadError> {
        let row = self
            .run_logs
            .iter_mut()
            .find(|log| log.log_id == log_id)
            .ok_or_else(|| LoadError::Database(format!("unknown log id {log_id}")))?;
        if row.end_time.is_some() {
            return Err(LoadError::Database(format!(
                "log row {log_id} already finalized"
            )));
        }
        row.end_time = Some(outcome.finished_at);
        row.status = outcome.status;
        row.records_processed = outcome.records_processed;
        row.error_message = outcome.error.clone();
        Ok(())
    }
}
