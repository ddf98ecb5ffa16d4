//! Core domain types shared by every component.
//!
//! `Task` is the sole mutable domain entity; everything else (presence,
//! queued ops) is transient bookkeeping around it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, client-generated task identifier. The server never rewrites it.
pub type TaskId = String;

/// The three ordered columns a task can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnId {
    Todo,
    InProgress,
    Done,
}

impl ColumnId {
    pub const ALL: [ColumnId; 3] = [ColumnId::Todo, ColumnId::InProgress, ColumnId::Done];
}

/// The sole mutable domain entity. Invariants: `id` unique, `order`
/// unique within `columnId`, `version` strictly increasing, `order`
/// finite, never partially observable mid-mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: f64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub creator_name: String,
    pub creator_color: String,
    pub updated_by_name: String,
    pub updated_by_color: String,
}

impl Task {
    pub const MAX_TITLE_GRAPHEMES: usize = 500;
    pub const MAX_DESCRIPTION_GRAPHEMES: usize = 5000;
}

/// A live participant's presence on the board. `user_id` is the connection id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    pub connected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editing_task_id: Option<TaskId>,
}

/// An editing status reported via `PRESENCE_UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Editing,
    Idle,
}

/// One offline-buffered client operation, replayed through the standard
/// handler chain on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOp {
    #[serde(rename = "type")]
    pub op_type: String,
    pub payload: serde_json::Value,
    pub client_timestamp: i64,
}

/// Generates a short, human-distinguishable owner id for lock acquisition.
/// A process-local identifier suffices for lock-ownership correctness;
/// user identity is not required.
pub fn new_process_owner_id() -> Uuid {
    Uuid::new_v4()
}
