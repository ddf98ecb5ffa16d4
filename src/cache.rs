//! AuthoritativeCache (C2): the in-memory/external hot store of tasks and
//! per-column membership, source of truth for live reads. Reads are
//! cache-first; on miss the cache hydrates itself from durable storage and
//! backfills the indices before returning.
//!
//! The three index updates composing `put`/`delete` (record, per-column
//! set, global set) are issued as a single pipelined group, guarded here by
//! one `RwLock` over all three structures rather than per-key locking
//! (DashMap's usual idiom elsewhere in this crate) — per-key locks cannot
//! give the cross-structure atomicity the invariant requires.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{ColumnId, Task, TaskId};
use crate::storage::SharedStore;

/// Sliding TTL applied to every cached record.
const ENTRY_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    task: Task,
    last_touched: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.last_touched.elapsed() > ENTRY_TTL
    }
}

struct Inner {
    records: HashMap<TaskId, Entry>,
    column_index: HashMap<ColumnId, HashSet<TaskId>>,
    board_index: HashSet<TaskId>,
}

impl Inner {
    fn empty() -> Self {
        let mut column_index = HashMap::new();
        for c in ColumnId::ALL {
            column_index.insert(c, HashSet::new());
        }
        Self {
            records: HashMap::new(),
            column_index,
            board_index: HashSet::new(),
        }
    }

    fn put_locked(&mut self, task: Task) {
        if let Some(existing) = self.records.get(&task.id) {
            if existing.task.column_id != task.column_id {
                if let Some(set) = self.column_index.get_mut(&existing.task.column_id) {
                    set.remove(&task.id);
                }
            }
        }
        self.column_index
            .entry(task.column_id)
            .or_default()
            .insert(task.id.clone());
        self.board_index.insert(task.id.clone());
        self.records.insert(
            task.id.clone(),
            Entry {
                task,
                last_touched: Instant::now(),
            },
        );
    }

    fn delete_locked(&mut self, id: &TaskId) {
        if let Some(entry) = self.records.remove(id) {
            if let Some(set) = self.column_index.get_mut(&entry.task.column_id) {
                set.remove(id);
            }
        }
        self.board_index.remove(id);
    }
}

/// The authoritative, cache-first store of live task state.
pub struct AuthoritativeCache {
    inner: RwLock<Inner>,
    store: SharedStore,
}

impl AuthoritativeCache {
    pub fn new(store: SharedStore) -> Self {
        Self {
            inner: RwLock::new(Inner::empty()),
            store,
        }
    }

    /// Writes the record plus both set memberships as a single group.
    pub async fn put(&self, task: Task) {
        let mut inner = self.inner.write().await;
        inner.put_locked(task);
    }

    /// Removes the record and both set memberships as a single group.
    pub async fn delete(&self, id: &TaskId) {
        let mut inner = self.inner.write().await;
        inner.delete_locked(id);
    }

    pub async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        {
            let mut inner = self.inner.write().await;
            if let Some(entry) = inner.records.get_mut(id) {
                if !entry.is_expired() {
                    entry.last_touched = Instant::now();
                    return Ok(Some(entry.task.clone()));
                }
            }
        }

        // Cache miss: hydrate from durable storage and backfill indices.
        if let Some(task) = self.store.get(id).await? {
            self.put(task.clone()).await;
            Ok(Some(task))
        } else {
            Ok(None)
        }
    }

    pub async fn scan_column(&self, column_id: ColumnId) -> Vec<Task> {
        let inner = self.inner.read().await;
        match inner.column_index.get(&column_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| inner.records.get(id))
                .map(|e| e.task.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Materializes all live tasks. On an empty cache, hydrates from
    /// durable storage first (cold-start path).
    pub async fn list_all(&self) -> Result<Vec<Task>> {
        let is_empty = {
            let inner = self.inner.read().await;
            inner.records.is_empty()
        };

        if is_empty {
            let tasks = self.store.list_all().await?;
            for task in &tasks {
                self.put(task.clone()).await;
            }
        }

        let inner = self.inner.read().await;
        Ok(inner.records.values().map(|e| e.task.clone()).collect())
    }

    /// Invariant check used by tests: every id in `board_index` belongs to
    /// exactly one column set.
    #[cfg(test)]
    async fn board_index_matches_column_union(&self) -> bool {
        let inner = self.inner.read().await;
        for id in &inner.board_index {
            let containing = inner
                .column_index
                .values()
                .filter(|set| set.contains(id))
                .count();
            if containing != 1 {
                return false;
            }
        }
        true
    }
}
