//! LockManager (C3): advisory per-task mutex with TTL and owner-verified
//! release. Acquire/release with TTL-bounded recovery is sufficient here;
//! no fencing tokens or cluster-wide total ordering are needed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::model::{Task, TaskId};

/// Default lease: bounds recovery time from a crash between acquire and
/// release.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

struct Holder {
    owner_id: Uuid,
    expires_at: Instant,
}

impl Holder {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Result of an acquisition attempt. On failure, carries the caller's best
/// known current task state so the loser can be notified.
pub struct AcquireResult {
    pub acquired: bool,
    pub holder_snapshot: Option<Task>,
}

pub struct LockManager {
    locks: DashMap<TaskId, Holder>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Set-if-absent with TTL. `current_state` is whatever the caller
    /// already has in hand for this task (used only to populate
    /// `holder_snapshot` on failure).
    pub fn acquire(
        &self,
        task_id: &TaskId,
        owner_id: Uuid,
        current_state: Option<Task>,
    ) -> AcquireResult {
        self.acquire_with_ttl(task_id, owner_id, DEFAULT_TTL, current_state)
    }

    /// Occupied/vacant check and insert happen under the same shard lock
    /// via `DashMap::entry`, so two concurrent callers for the same
    /// `task_id` can't both observe "absent" and both win.
    pub fn acquire_with_ttl(
        &self,
        task_id: &TaskId,
        owner_id: Uuid,
        ttl: Duration,
        current_state: Option<Task>,
    ) -> AcquireResult {
        match self.locks.entry(task_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired() {
                    entry.insert(Holder {
                        owner_id,
                        expires_at: Instant::now() + ttl,
                    });
                    AcquireResult {
                        acquired: true,
                        holder_snapshot: None,
                    }
                } else {
                    AcquireResult {
                        acquired: false,
                        holder_snapshot: current_state,
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Holder {
                    owner_id,
                    expires_at: Instant::now() + ttl,
                });
                AcquireResult {
                    acquired: true,
                    holder_snapshot: None,
                }
            }
        }
    }

    /// Atomic compare-and-delete: releases only if `owner_id` still holds
    /// the lock, so a late release from a timed-out holder can't erase a
    /// successor's lock.
    pub fn release(&self, task_id: &TaskId, owner_id: Uuid) {
        self.locks.remove_if(task_id, |_, holder| holder.owner_id == owner_id);
    }

    #[cfg(test)]
    fn is_locked(&self, task_id: &TaskId) -> bool {
        self.locks
            .get(task_id)
            .map(|h| !h.is_expired())
            .unwrap_or(false)
    }
}
