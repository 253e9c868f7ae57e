//! The cleanup engine.
//!
//! Each tick walks the three diagnostic tables, queries rows older than
//! the retention window, and deletes them in per-partition-key batches.
//! Batches pause briefly between submissions to avoid throttling and the
//! tick stops once the deletion budget is spent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use gridwatch_core::{HealthState, HealthStateCell, Ticks, WatchdogSettings};

use crate::tables::{BatchOptions, TableError, TableResult, TableRow, TableStore};

/// The diagnostic tables subject to cleanup.
pub const DIAGNOSTIC_TABLES: [&str; 3] = [
    "WADPerformanceCountersTable",
    "WADDiagnosticInfrastructureLogsTable",
    "WADLogsTable",
];

/// Upper bound on rows per deletion batch.
const MAXIMUM_BATCH_SIZE: usize = 100;

/// Pause between batch submissions.
const BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Attempts per batch before the tick gives up on it.
const BATCH_ATTEMPTS: u32 = 3;

/// Base backoff between batch attempts; doubles per attempt.
const BATCH_BACKOFF: Duration = Duration::from_secs(1);

/// Overall wall-clock cap on one batch including retries.
const BATCH_DEADLINE: Duration = Duration::from_secs(60);

/// Deletes aged diagnostic rows from the external table store.
pub struct CleanupEngine {
    /// Absent when no endpoint/SAS token is configured; every tick is a
    /// no-op then.
    store: Option<Arc<dyn TableStore>>,
    health: HealthStateCell,
}

impl CleanupEngine {
    pub fn new(store: Option<Arc<dyn TableStore>>) -> Self {
        Self {
            store,
            health: HealthStateCell::default(),
        }
    }

    /// Current engine health, as seen by the self-reporter.
    pub fn health(&self) -> HealthState {
        self.health.get()
    }

    /// Run one cleanup pass. Returns the number of rows deleted.
    pub async fn tick(&self, time_to_keep: Duration, target_count: u32) -> usize {
        let Some(store) = &self.store else {
            debug!("cleanup skipped, no table store configured");
            return 0;
        };

        let cutoff = Ticks::now().saturating_sub(time_to_keep);
        let mut total = 0usize;
        let mut failed = false;

        for table in DIAGNOSTIC_TABLES {
            if total >= target_count as usize {
                break;
            }
            match self
                .clean_table(store.as_ref(), table, cutoff, target_count, &mut total)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    warn!(%table, error = %e, "cleanup pass failed");
                    self.health.set(HealthState::Error);
                    failed = true;
                }
            }
        }

        if !failed {
            self.health.set(HealthState::Ok);
        }
        if total > 0 {
            info!(deleted = total, "cleanup pass finished");
        }
        total
    }

    /// Run the periodic tick loop until shutdown.
    pub async fn run(
        self: Arc<Self>,
        settings: watch::Receiver<WatchdogSettings>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("cleanup engine started");
        let mut last_tick = Duration::ZERO;
        loop {
            let (interval, time_to_keep, target_count) = {
                let s = settings.borrow();
                (
                    s.diagnostic_interval,
                    s.diagnostic_time_to_keep,
                    s.diagnostic_target_count,
                )
            };
            // An overrunning pass makes the next one fire immediately.
            let wait = interval.saturating_sub(last_tick);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let started = std::time::Instant::now();
                    self.tick(time_to_keep, target_count).await;
                    last_tick = started.elapsed();
                }
                _ = shutdown.changed() => {
                    info!("cleanup engine shutting down");
                    break;
                }
            }
        }
    }

    /// Delete aged rows from one table until the budget is spent or the
    /// server runs out of continuations.
    async fn clean_table(
        &self,
        store: &dyn TableStore,
        table: &str,
        cutoff: Ticks,
        target_count: u32,
        total: &mut usize,
    ) -> TableResult<()> {
        if !store.table_exists(table).await? {
            debug!(%table, "table absent, skipping");
            return Ok(());
        }

        let mut continuation: Option<String> = None;
        loop {
            let (rows, next) = store
                .query_by_timestamp(table, cutoff, continuation.as_deref())
                .await?;

            for batch in group_batches(rows) {
                *total += self.submit_batch(store, table, batch).await?;
                if *total >= target_count as usize {
                    return Ok(());
                }
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            match next {
                Some(c) => continuation = Some(c),
                None => return Ok(()),
            }
        }
    }

    /// Submit one batch with retry. A ResourceNotFound naming a row evicts
    /// it and resubmits the remainder; an unparseable or out-of-range
    /// index abandons the batch.
    async fn submit_batch(
        &self,
        store: &dyn TableStore,
        table: &str,
        rows: Vec<TableRow>,
    ) -> TableResult<usize> {
        let submit = self.submit_batch_inner(store, table, rows);
        match tokio::time::timeout(BATCH_DEADLINE, submit).await {
            Ok(result) => result,
            Err(_) => Err(TableError::Transient("batch deadline exceeded".into())),
        }
    }

    async fn submit_batch_inner(
        &self,
        store: &dyn TableStore,
        table: &str,
        mut rows: Vec<TableRow>,
    ) -> TableResult<usize> {
        let options = BatchOptions::default();
        let mut attempts = 0u32;
        let mut backoff = BATCH_BACKOFF;

        loop {
            if rows.is_empty() {
                return Ok(0);
            }
            match store.batch_delete(table, &rows, &options).await {
                Ok(deleted) => return Ok(deleted),
                Err(TableError::ResourceNotFound { index: Some(i) }) if i < rows.len() => {
                    debug!(%table, index = i, "row gone, evicting from batch");
                    rows.remove(i);
                    // Resubmit the remainder immediately.
                }
                Err(TableError::ResourceNotFound { index }) => {
                    warn!(%table, ?index, "unusable batch error index, abandoning batch");
                    return Ok(0);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= BATCH_ATTEMPTS {
                        return Err(e);
                    }
                    debug!(%table, attempts, error = %e, "batch retry");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

/// Group rows by partition key (batches must not span keys) and split
/// each group at the batch size cap. Input order is preserved within a
/// group.
fn group_batches(rows: Vec<TableRow>) -> Vec<Vec<TableRow>> {
    let mut groups: Vec<(String, Vec<TableRow>)> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|(pk, _)| *pk == row.partition_key) {
            Some((_, group)) => group.push(row),
            None => groups.push((row.partition_key.clone(), vec![row])),
        }
    }
    groups
        .into_iter()
        .flat_map(|(_, group)| {
            group
                .chunks(MAXIMUM_BATCH_SIZE)
                .map(<[TableRow]>::to_vec)
                .collect::<Vec<_>>()
        })
        .collect()
}
