//! ConflictResolver (C6): classifies concurrent events and builds
//! loser-notifications.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::ConflictAuditRecord;
use crate::model::Task;

/// The three concurrent-operation classes this crate recognizes. Only
/// `MoveMove` produces a runtime conflict (serialized via the lock
/// manager); the others are resolved structurally and are classified here
/// purely for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictClass {
    MoveEdit,
    MoveMove,
    ReorderInsert,
}

/// Private message to a lock-acquisition loser, carrying the
/// authoritative post-resolution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictNotify {
    pub task_id: String,
    pub resolved_state: Task,
    pub message: String,
}

impl ConflictNotify {
    pub fn new(resolved_state: Task) -> Self {
        let message = format!(
            "your move lost to a concurrent move on \"{}\"; the board has been updated",
            resolved_state.title
        );
        Self {
            task_id: resolved_state.id.clone(),
            resolved_state,
            message,
        }
    }
}

/// Builds the append-only audit row for a resolved move+move conflict.
/// Never on the critical path — callers hand this to
/// `audit::record_fire_and_forget`.
pub fn build_audit_record(
    winner_event: &str,
    loser_event: &str,
    winner_id: &str,
    loser_id: &str,
    resolved_state: Task,
    message: String,
) -> ConflictAuditRecord {
    ConflictAuditRecord {
        id: Uuid::new_v4(),
        task_id: resolved_state.id.clone(),
        winner_event: winner_event.to_string(),
        loser_event: loser_event.to_string(),
        winner_id: winner_id.to_string(),
        loser_id: loser_id.to_string(),
        resolved_state,
        message,
        at: chrono::Utc::now(),
    }
}
