//! The external table store abstraction.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use gridwatch_core::Ticks;

/// Result type alias for table-store operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors surfaced by the table store.
#[derive(Debug, Clone, Error)]
pub enum TableError {
    #[error("transient table store fault: {0}")]
    Transient(String),

    /// The server rejected a batch because one row no longer exists. The
    /// index identifies the offending row when it could be parsed out of
    /// the response.
    #[error("resource not found at batch index {index:?}")]
    ResourceNotFound { index: Option<usize> },

    #[error("table storage error: {0}")]
    Storage(String),
}

impl TableError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TableError::Transient(_))
    }
}

/// One diagnostic row, identified by partition and row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: Ticks,
}

/// Options carried by a batch submission.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Server-side timeout per batch.
    pub server_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            server_timeout: Duration::from_secs(5),
        }
    }
}

/// The external tabular store holding diagnostic records.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Whether the named table exists.
    async fn table_exists(&self, table: &str) -> TableResult<bool>;

    /// One page of rows with `timestamp < cutoff`.
    async fn query_by_timestamp(
        &self,
        table: &str,
        cutoff: Ticks,
        continuation: Option<&str>,
    ) -> TableResult<(Vec<TableRow>, Option<String>)>;

    /// Delete a batch of rows. Every row must share one partition key.
    /// Returns the number deleted.
    async fn batch_delete(
        &self,
        table: &str,
        rows: &[TableRow],
        options: &BatchOptions,
    ) -> TableResult<usize>;
}

/// In-memory table store for tests: seedable rows, scriptable batch
/// faults, and a record of every batch submission.
#[derive(Default)]
pub struct MockTableStore {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    tables: std::collections::HashMap<String, Vec<TableRow>>,
    page_size: usize,
    batch_sizes: Vec<usize>,
    batch_faults: VecDeque<TableError>,
}

impl MockTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn seed_table(&self, table: &str, rows: Vec<TableRow>) {
        self.lock().tables.insert(table.to_string(), rows);
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size;
    }

    /// Queue a fault returned by the next batch submission.
    pub fn queue_batch_fault(&self, error: TableError) {
        self.lock().batch_faults.push_back(error);
    }

    /// Sizes of every submitted batch, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    /// Rows remaining in a table.
    pub fn remaining(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, Vec::len)
    }
}

#[async_trait]
impl TableStore for MockTableStore {
    async fn table_exists(&self, table: &str) -> TableResult<bool> {
        Ok(self.lock().tables.contains_key(table))
    }

    async fn query_by_timestamp(
        &self,
        table: &str,
        cutoff: Ticks,
        continuation: Option<&str>,
    ) -> TableResult<(Vec<TableRow>, Option<String>)> {
        let state = self.lock();
        let Some(rows) = state.tables.get(table) else {
            return Err(TableError::Storage(format!("table {table} does not exist")));
        };
        let matching: Vec<TableRow> = rows
            .iter()
            .filter(|r| r.timestamp < cutoff)
            .cloned()
            .collect();

        let offset: usize = continuation.and_then(|c| c.parse().ok()).unwrap_or(0);
        if state.page_size == 0 || offset + state.page_size >= matching.len() {
            Ok((matching.get(offset..).unwrap_or_default().to_vec(), None))
        } else {
            let end = offset + state.page_size;
            Ok((matching[offset..end].to_vec(), Some(end.to_string())))
        }
    }

    async fn batch_delete(
        &self,
        table: &str,
        rows: &[TableRow],
        _options: &BatchOptions,
    ) -> TableResult<usize> {
        let mut state = self.lock();
        state.batch_sizes.push(rows.len());
        if let Some(fault) = state.batch_faults.pop_front() {
            return Err(fault);
        }
        let Some(stored) = state.tables.get_mut(table) else {
            return Err(TableError::Storage(format!("table {table} does not exist")));
        };
        let before = stored.len();
        stored.retain(|r| !rows.contains(r));
        Ok(before - stored.len())
    }
}
