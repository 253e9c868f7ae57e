//! WatchdogStore — redb-backed durable state with replica-role gating.
//!
//! Every mutation happens inside a single write transaction; dropping an
//! uncommitted transaction aborts it, so no partial write survives a
//! cancelled tick. Engines must check both `read_status` and
//! `write_status` before touching state.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use redb::{Database, ReadableTable};
use tracing::debug;

use gridwatch_core::Ticks;

use crate::error::{StoreError, StoreResult};
use crate::tables::{HEALTH_CHECKS, METRIC_CHECKS, SCHEDULE};
use crate::types::{HealthCheck, MetricCheck, ScheduledItem};

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Role of this replica, as driven by the lifecycle host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    Primary,
    ActiveSecondary,
    IdleSecondary,
    None,
}

/// Result of an access-status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Reconfiguring,
    NotReady,
    NotPrimary,
}

type RoleCallback = Box<dyn Fn(ReplicaRole) + Send + Sync>;

/// Thread-safe durable store backed by redb.
#[derive(Clone)]
pub struct WatchdogStore {
    db: Arc<Database>,
    role: Arc<AtomicU8>,
    reconfiguring: Arc<AtomicBool>,
    callbacks: Arc<Mutex<Vec<RoleCallback>>>,
}

impl WatchdogStore {
    /// Open (or create) a persistent store at the given path. The replica
    /// starts without a role; the lifecycle host promotes it.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!(?path, "watchdog store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!("in-memory watchdog store opened");
        Ok(store)
    }

    fn from_db(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            role: Arc::new(AtomicU8::new(encode_role(ReplicaRole::None))),
            reconfiguring: Arc::new(AtomicBool::new(false)),
            callbacks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transient))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        txn.open_table(METRIC_CHECKS).map_err(map_err!(Storage))?;
        txn.commit().map_err(map_err!(Transient))?;
        Ok(())
    }

    // ── Role gating ────────────────────────────────────────────────

    /// Current replica role.
    pub fn role(&self) -> ReplicaRole {
        decode_role(self.role.load(Ordering::Acquire))
    }

    /// Drive a role transition. Fires every registered callback.
    pub fn set_role(&self, role: ReplicaRole) {
        self.role.store(encode_role(role), Ordering::Release);
        debug!(?role, "replica role changed");
        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for cb in callbacks.iter() {
            cb(role);
        }
    }

    /// Mark the replica as reconfiguring; both statuses report it.
    pub fn set_reconfiguring(&self, reconfiguring: bool) {
        self.reconfiguring.store(reconfiguring, Ordering::Release);
    }

    /// Register a callback fired on every role transition.
    pub fn on_role_change<F>(&self, callback: F)
    where
        F: Fn(ReplicaRole) + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(callback));
    }

    /// Read-access status of this replica.
    pub fn read_status(&self) -> AccessStatus {
        if self.reconfiguring.load(Ordering::Acquire) {
            return AccessStatus::Reconfiguring;
        }
        match self.role() {
            ReplicaRole::Primary | ReplicaRole::ActiveSecondary => AccessStatus::Granted,
            ReplicaRole::IdleSecondary | ReplicaRole::None => AccessStatus::NotReady,
        }
    }

    /// Write-access status of this replica.
    pub fn write_status(&self) -> AccessStatus {
        if self.reconfiguring.load(Ordering::Acquire) {
            return AccessStatus::Reconfiguring;
        }
        match self.role() {
            ReplicaRole::Primary => AccessStatus::Granted,
            _ => AccessStatus::NotPrimary,
        }
    }

    // ── Transactions ───────────────────────────────────────────────

    /// Start a write transaction. Commit consumes it; dropping it without
    /// commit aborts every change made through it.
    pub fn begin(&self) -> StoreResult<Tx> {
        match self.write_status() {
            AccessStatus::Granted => {}
            AccessStatus::NotPrimary => return Err(StoreError::NotPrimary),
            AccessStatus::Reconfiguring | AccessStatus::NotReady => {
                return Err(StoreError::NotReady)
            }
        }
        let txn = self.db.begin_write().map_err(map_err!(Transient))?;
        Ok(Tx { txn })
    }

    /// Start a read snapshot for ordered listing.
    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        match self.read_status() {
            AccessStatus::Granted => {}
            _ => return Err(StoreError::NotReady),
        }
        let txn = self.db.begin_read().map_err(map_err!(Transient))?;
        Ok(Snapshot { txn })
    }
}

fn encode_role(role: ReplicaRole) -> u8 {
    match role {
        ReplicaRole::None => 0,
        ReplicaRole::Primary => 1,
        ReplicaRole::ActiveSecondary => 2,
        ReplicaRole::IdleSecondary => 3,
    }
}

fn decode_role(raw: u8) -> ReplicaRole {
    match raw {
        1 => ReplicaRole::Primary,
        2 => ReplicaRole::ActiveSecondary,
        3 => ReplicaRole::IdleSecondary,
        _ => ReplicaRole::None,
    }
}

/// A scoped write transaction over the watchdog maps.
pub struct Tx {
    txn: redb::WriteTransaction,
}

impl Tx {
    /// Commit every change made through this transaction.
    pub fn commit(self) -> StoreResult<()> {
        self.txn.commit().map_err(map_err!(Transient))
    }

    // ── Health checks ──────────────────────────────────────────────

    /// Insert or replace a health check under its durable key.
    pub fn put_check(&self, hc: &HealthCheck) -> StoreResult<()> {
        let key = hc.key();
        let value = serde_json::to_vec(hc).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        table
            .insert(key.as_str(), value.as_slice())
            .map_err(map_err!(Storage))?;
        Ok(())
    }

    /// Insert a health check only if its key is vacant. Returns whether it
    /// was inserted.
    pub fn try_add_check(&self, hc: &HealthCheck) -> StoreResult<bool> {
        let key = hc.key();
        let mut table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        if table.get(key.as_str()).map_err(map_err!(Storage))?.is_some() {
            return Ok(false);
        }
        let value = serde_json::to_vec(hc).map_err(map_err!(Serialize))?;
        table
            .insert(key.as_str(), value.as_slice())
            .map_err(map_err!(Storage))?;
        Ok(true)
    }

    /// Fetch a health check by key.
    pub fn get_check(&self, key: &str) -> StoreResult<Option<HealthCheck>> {
        let table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        let result = match table.get(key).map_err(map_err!(Storage))? {
            Some(guard) => {
                let hc = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(hc))
            }
            None => Ok(None),
        };
        result
    }

    /// Compare-and-swap: replace the value under `key` with `new` only if
    /// the stored value still equals `witness`. Returns whether the swap
    /// happened.
    pub fn update_check_if(
        &self,
        key: &str,
        new: &HealthCheck,
        witness: &HealthCheck,
    ) -> StoreResult<bool> {
        let mut table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        let matches = match table.get(key).map_err(map_err!(Storage))? {
            Some(guard) => {
                let stored: HealthCheck =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                stored == *witness
            }
            None => false,
        };
        if !matches {
            return Ok(false);
        }
        let value = serde_json::to_vec(new).map_err(map_err!(Serialize))?;
        table
            .insert(key, value.as_slice())
            .map_err(map_err!(Storage))?;
        Ok(true)
    }

    /// Remove a health check. Returns whether it existed.
    pub fn remove_check(&self, key: &str) -> StoreResult<bool> {
        let mut table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        let existed = table.remove(key).map_err(map_err!(Storage))?.is_some();
        Ok(existed)
    }

    // ── Schedule ───────────────────────────────────────────────────

    /// Insert a schedule entry only if its tick value is vacant. Returns
    /// whether it was inserted; collisions are the caller's to resolve by
    /// incrementing the tick.
    pub fn try_add_scheduled(&self, item: &ScheduledItem) -> StoreResult<bool> {
        let mut table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        if table
            .get(item.execution_ticks.0)
            .map_err(map_err!(Storage))?
            .is_some()
        {
            return Ok(false);
        }
        let value = serde_json::to_vec(item).map_err(map_err!(Serialize))?;
        table
            .insert(item.execution_ticks.0, value.as_slice())
            .map_err(map_err!(Storage))?;
        Ok(true)
    }

    /// Remove a schedule entry by tick value. Returns whether it existed.
    pub fn remove_scheduled(&self, ticks: Ticks) -> StoreResult<bool> {
        let mut table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        let existed = table.remove(ticks.0).map_err(map_err!(Storage))?.is_some();
        Ok(existed)
    }

    /// Remove every schedule entry pointing at `key`. Returns the number
    /// removed. Re-registration resets the schedule through this.
    pub fn remove_scheduled_for_key(&self, key: &str) -> StoreResult<usize> {
        let ticks: Vec<u64> = {
            let table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
            let mut found = Vec::new();
            for entry in table.iter().map_err(map_err!(Storage))? {
                let (tick, value) = entry.map_err(map_err!(Storage))?;
                let item: ScheduledItem =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if item.key == key {
                    found.push(tick.value());
                }
            }
            found
        };
        let mut table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        for tick in &ticks {
            table.remove(*tick).map_err(map_err!(Storage))?;
        }
        Ok(ticks.len())
    }

    /// Entries due strictly before `now`, in ascending tick order.
    pub fn due_scheduled(&self, now: Ticks) -> StoreResult<Vec<ScheduledItem>> {
        let table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        let mut due = Vec::new();
        for entry in table.range(..now.0).map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let item: ScheduledItem =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            due.push(item);
        }
        Ok(due)
    }

    // ── Metric checks ──────────────────────────────────────────────

    /// Insert or replace a metric subscription under its durable key.
    pub fn put_metric_check(&self, mc: &MetricCheck) -> StoreResult<()> {
        let key = mc.key();
        let value = serde_json::to_vec(mc).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(METRIC_CHECKS).map_err(map_err!(Storage))?;
        table
            .insert(key.as_str(), value.as_slice())
            .map_err(map_err!(Storage))?;
        Ok(())
    }
}

/// A read snapshot over the watchdog maps.
pub struct Snapshot {
    txn: redb::ReadTransaction,
}

impl Snapshot {
    /// Health checks whose key starts with `prefix`, in key order. An
    /// empty prefix matches everything.
    pub fn checks_with_prefix(&self, prefix: &str) -> StoreResult<Vec<HealthCheck>> {
        let table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            if key.value().starts_with(prefix) {
                let hc: HealthCheck =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(hc);
            }
        }
        Ok(results)
    }

    /// Fetch a health check by key.
    pub fn get_check(&self, key: &str) -> StoreResult<Option<HealthCheck>> {
        let table = self.txn.open_table(HEALTH_CHECKS).map_err(map_err!(Storage))?;
        let result = match table.get(key).map_err(map_err!(Storage))? {
            Some(guard) => {
                let hc = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(hc))
            }
            None => Ok(None),
        };
        result
    }

    /// Entries due strictly before `now`, in ascending tick order.
    pub fn due_scheduled(&self, now: Ticks) -> StoreResult<Vec<ScheduledItem>> {
        let table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        let mut due = Vec::new();
        for entry in table.range(..now.0).map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let item: ScheduledItem =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            due.push(item);
        }
        Ok(due)
    }

    /// Metric subscriptions whose key starts with `prefix`, in key order.
    pub fn metric_checks_with_prefix(&self, prefix: &str) -> StoreResult<Vec<MetricCheck>> {
        let table = self.txn.open_table(METRIC_CHECKS).map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            if key.value().starts_with(prefix) {
                let mc: MetricCheck =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(mc);
            }
        }
        Ok(results)
    }

    /// Every metric subscription, in key order.
    pub fn metric_checks_ordered(&self) -> StoreResult<Vec<MetricCheck>> {
        self.metric_checks_with_prefix("")
    }

    /// Every schedule entry, in ascending tick order.
    pub fn scheduled_ordered(&self) -> StoreResult<Vec<ScheduledItem>> {
        let table = self.txn.open_table(SCHEDULE).map_err(map_err!(Storage))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let item: ScheduledItem =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(item);
        }
        Ok(results)
    }

    /// Schedule entries pointing at `key`.
    pub fn scheduled_for_key(&self, key: &str) -> StoreResult<Vec<ScheduledItem>> {
        Ok(self
            .scheduled_ordered()?
            .into_iter()
            .filter(|item| item.key == key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use uuid::Uuid;

    fn primary_store() -> WatchdogStore {
        let store = WatchdogStore::open_in_memory().unwrap();
        store.set_role(ReplicaRole::Primary);
        store
    }

    fn check(service: &str, partition: Option<Uuid>) -> HealthCheck {
        HealthCheck {
            name: "hc".to_string(),
            service_name: service.to_string(),
            partition,
            endpoint: None,
            suffix_path: "healthz".to_string(),
            method: "GET".to_string(),
            content: None,
            media_type: None,
            frequency_ms: 60_000,
            expected_duration_ms: 200,
            maximum_duration_ms: 5_000,
            headers: HashMap::new(),
            warning_status_codes: HashSet::new(),
            error_status_codes: HashSet::new(),
            last_attempt: None,
            failure_count: 0,
            result_code: 0,
            duration_ms: 0,
        }
    }

    // ── Health check map ───────────────────────────────────────────

    #[test]
    fn check_put_get_remove() {
        let store = primary_store();
        let p = Uuid::new_v4();
        let hc = check("fabric:/A/B", Some(p));
        let key = hc.key();

        let tx = store.begin().unwrap();
        tx.put_check(&hc).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        assert_eq!(tx.get_check(&key).unwrap(), Some(hc));
        assert!(tx.remove_check(&key).unwrap());
        assert!(!tx.remove_check(&key).unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn try_add_check_respects_existing() {
        let store = primary_store();
        let hc = check("fabric:/A/B", None);

        let tx = store.begin().unwrap();
        assert!(tx.try_add_check(&hc).unwrap());
        assert!(!tx.try_add_check(&hc).unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn update_check_if_is_a_witness_cas() {
        let store = primary_store();
        let hc = check("fabric:/A/B", None);
        let key = hc.key();

        let tx = store.begin().unwrap();
        tx.put_check(&hc).unwrap();
        tx.commit().unwrap();

        let mut updated = hc.clone();
        updated.failure_count = 1;

        // Matching witness swaps.
        let tx = store.begin().unwrap();
        assert!(tx.update_check_if(&key, &updated, &hc).unwrap());
        tx.commit().unwrap();

        // Stale witness does not.
        let mut newer = updated.clone();
        newer.failure_count = 2;
        let tx = store.begin().unwrap();
        assert!(!tx.update_check_if(&key, &newer, &hc).unwrap());
        assert_eq!(tx.get_check(&key).unwrap().unwrap().failure_count, 1);
        tx.commit().unwrap();
    }

    #[test]
    fn checks_listed_in_key_order_with_prefix() {
        let store = primary_store();
        let tx = store.begin().unwrap();
        tx.put_check(&check("fabric:/A/B", None)).unwrap();
        tx.put_check(&check("fabric:/A/C", None)).unwrap();
        tx.put_check(&check("fabric:/Other/X", None)).unwrap();
        tx.commit().unwrap();

        let snap = store.snapshot().unwrap();
        let all = snap.checks_with_prefix("").unwrap();
        assert_eq!(all.len(), 3);
        // Lexicographic by key.
        assert_eq!(all[0].service_name, "fabric:/A/B");
        assert_eq!(all[1].service_name, "fabric:/A/C");

        let filtered = snap.checks_with_prefix("/A/").unwrap();
        assert_eq!(filtered.len(), 2);
    }

    // ── Schedule map ───────────────────────────────────────────────

    #[test]
    fn schedule_collision_is_detected() {
        let store = primary_store();
        let tx = store.begin().unwrap();
        let item = ScheduledItem {
            execution_ticks: Ticks(1000),
            key: "/A/B/".to_string(),
        };
        assert!(tx.try_add_scheduled(&item).unwrap());
        // Same tick value collides regardless of key.
        let other = ScheduledItem {
            execution_ticks: Ticks(1000),
            key: "/A/C/".to_string(),
        };
        assert!(!tx.try_add_scheduled(&other).unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn due_scheduled_is_ascending_and_exclusive() {
        let store = primary_store();
        let tx = store.begin().unwrap();
        for (ticks, key) in [(300u64, "c"), (100, "a"), (200, "b"), (400, "d")] {
            tx.try_add_scheduled(&ScheduledItem {
                execution_ticks: Ticks(ticks),
                key: key.to_string(),
            })
            .unwrap();
        }
        let due = tx.due_scheduled(Ticks(400)).unwrap();
        let keys: Vec<&str> = due.iter().map(|i| i.key.as_str()).collect();
        // Ascending order; the entry at `now` is not yet due.
        assert_eq!(keys, vec!["a", "b", "c"]);
        tx.commit().unwrap();
    }

    #[test]
    fn remove_scheduled_for_key_drops_every_entry() {
        let store = primary_store();
        let tx = store.begin().unwrap();
        for ticks in [100u64, 200, 300] {
            tx.try_add_scheduled(&ScheduledItem {
                execution_ticks: Ticks(ticks),
                key: "/A/B/".to_string(),
            })
            .unwrap();
        }
        tx.try_add_scheduled(&ScheduledItem {
            execution_ticks: Ticks(400),
            key: "/A/C/".to_string(),
        })
        .unwrap();

        assert_eq!(tx.remove_scheduled_for_key("/A/B/").unwrap(), 3);
        tx.commit().unwrap();

        let snap = store.snapshot().unwrap();
        let remaining = snap.scheduled_ordered().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "/A/C/");
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn dropped_transaction_aborts() {
        let store = primary_store();
        {
            let tx = store.begin().unwrap();
            tx.put_check(&check("fabric:/A/B", None)).unwrap();
            // No commit.
        }
        let snap = store.snapshot().unwrap();
        assert!(snap.checks_with_prefix("").unwrap().is_empty());
    }

    // ── Role gating ────────────────────────────────────────────────

    #[test]
    fn fresh_store_has_no_access() {
        let store = WatchdogStore::open_in_memory().unwrap();
        assert_eq!(store.read_status(), AccessStatus::NotReady);
        assert_eq!(store.write_status(), AccessStatus::NotPrimary);
        assert!(matches!(store.begin(), Err(StoreError::NotPrimary)));
    }

    #[test]
    fn primary_grants_both() {
        let store = primary_store();
        assert_eq!(store.read_status(), AccessStatus::Granted);
        assert_eq!(store.write_status(), AccessStatus::Granted);
    }

    #[test]
    fn secondary_reads_but_does_not_write() {
        let store = WatchdogStore::open_in_memory().unwrap();
        store.set_role(ReplicaRole::ActiveSecondary);
        assert_eq!(store.read_status(), AccessStatus::Granted);
        assert_eq!(store.write_status(), AccessStatus::NotPrimary);
    }

    #[test]
    fn reconfiguration_blocks_access() {
        let store = primary_store();
        store.set_reconfiguring(true);
        assert_eq!(store.read_status(), AccessStatus::Reconfiguring);
        assert_eq!(store.write_status(), AccessStatus::Reconfiguring);
        store.set_reconfiguring(false);
        assert_eq!(store.write_status(), AccessStatus::Granted);
    }

    #[test]
    fn role_change_fires_callbacks() {
        let store = WatchdogStore::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_role_change(move |role| {
            sink.lock().unwrap().push(role);
        });

        store.set_role(ReplicaRole::Primary);
        store.set_role(ReplicaRole::ActiveSecondary);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![ReplicaRole::Primary, ReplicaRole::ActiveSecondary]
        );
    }

    // ── Persistence ────────────────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("watchdog.redb");
        let p = Uuid::new_v4();

        {
            let store = WatchdogStore::open(&db_path).unwrap();
            store.set_role(ReplicaRole::Primary);
            let tx = store.begin().unwrap();
            tx.put_check(&check("fabric:/A/B", Some(p))).unwrap();
            tx.try_add_scheduled(&ScheduledItem {
                execution_ticks: Ticks(1234),
                key: format!("/A/B/{p}"),
            })
            .unwrap();
            tx.commit().unwrap();
        }

        let store = WatchdogStore::open(&db_path).unwrap();
        store.set_role(ReplicaRole::Primary);
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.checks_with_prefix("").unwrap().len(), 1);
        assert_eq!(snap.scheduled_ordered().unwrap().len(), 1);
    }
}
