//! Wire-level event protocol and payload validation: every handler's
//! first act is validating its payload before any state mutation.

use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;
use crate::model::{ColumnId, PresenceStatus, QueuedOp, Task, TaskId, UserPresence};

/// Client -> server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "TASK_CREATE")]
    TaskCreate(TaskCreatePayload),
    #[serde(rename = "TASK_UPDATE")]
    TaskUpdate(TaskUpdatePayload),
    #[serde(rename = "TASK_MOVE")]
    TaskMove(TaskMovePayload),
    #[serde(rename = "TASK_DELETE")]
    TaskDelete(TaskDeletePayload),
    #[serde(rename = "REPLAY_OPS")]
    ReplayOps(Vec<QueuedOp>),
    #[serde(rename = "PRESENCE_UPDATE")]
    PresenceUpdate(PresenceUpdatePayload),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreatePayload {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub creator_name: Option<String>,
    pub creator_color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdatePayload {
    pub id: TaskId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub version: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMovePayload {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub order: f64,
    pub version: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeletePayload {
    pub id: TaskId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdatePayload {
    pub status: PresenceStatus,
    pub task_id: Option<TaskId>,
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "BOARD_SNAPSHOT")]
    BoardSnapshot(BoardSnapshot),
    #[serde(rename = "TASK_CREATED")]
    TaskCreated(Task),
    #[serde(rename = "TASK_UPDATED")]
    TaskUpdated(Task),
    #[serde(rename = "TASK_MOVED")]
    TaskMoved(Task),
    #[serde(rename = "TASK_DELETED")]
    TaskDeleted { id: TaskId },
    #[serde(rename = "CONFLICT_NOTIFY")]
    ConflictNotify(crate::conflict::ConflictNotify),
    #[serde(rename = "PRESENCE_STATE")]
    PresenceState(Vec<UserPresence>),
    #[serde(rename = "ERROR")]
    Error { code: crate::error::ErrorCode, message: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub tasks: Vec<Task>,
    pub presence: Vec<UserPresence>,
}

const MAX_REPLAY_OPS: usize = 500;

/// Validates a payload before it reaches `TaskService`. Rejected payloads
/// are never broadcast.
pub fn validate(event: &ClientEvent) -> Result<(), CoordinatorError> {
    match event {
        ClientEvent::TaskCreate(p) => {
            validate_id(&p.id)?;
            validate_title(&p.title)?;
            validate_description(&p.description)?;
        }
        ClientEvent::TaskUpdate(p) => {
            validate_id(&p.id)?;
            if p.title.is_none() && p.description.is_none() {
                return Err(CoordinatorError::Validation(
                    "update requires at least one of title/description".to_string(),
                ));
            }
            if let Some(title) = &p.title {
                validate_title(title)?;
            }
            if let Some(description) = &p.description {
                validate_description(description)?;
            }
            validate_version(p.version)?;
        }
        ClientEvent::TaskMove(p) => {
            validate_id(&p.id)?;
            if !p.order.is_finite() {
                return Err(CoordinatorError::Validation("order must be finite".to_string()));
            }
            validate_version(p.version)?;
        }
        ClientEvent::TaskDelete(p) => {
            validate_id(&p.id)?;
        }
        ClientEvent::ReplayOps(ops) => {
            if ops.is_empty() || ops.len() > MAX_REPLAY_OPS {
                return Err(CoordinatorError::Validation(format!(
                    "replay size must be 1..{MAX_REPLAY_OPS}, got {}",
                    ops.len()
                )));
            }
            for op in ops {
                if op.client_timestamp <= 0 {
                    return Err(CoordinatorError::Validation(
                        "clientTimestamp must be a positive integer".to_string(),
                    ));
                }
            }
        }
        ClientEvent::PresenceUpdate(_) => {}
    }
    Ok(())
}

fn validate_id(id: &str) -> Result<(), CoordinatorError> {
    if id.trim().is_empty() {
        return Err(CoordinatorError::Validation("id must be non-empty".to_string()));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), CoordinatorError> {
    let len = title.chars().count();
    if len == 0 || len > Task::MAX_TITLE_GRAPHEMES {
        return Err(CoordinatorError::Validation(format!(
            "title length must be 1..{}, got {len}",
            Task::MAX_TITLE_GRAPHEMES
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), CoordinatorError> {
    let len = description.chars().count();
    if len > Task::MAX_DESCRIPTION_GRAPHEMES {
        return Err(CoordinatorError::Validation(format!(
            "description length must be <= {}, got {len}",
            Task::MAX_DESCRIPTION_GRAPHEMES
        )));
    }
    Ok(())
}

fn validate_version(version: u64) -> Result<(), CoordinatorError> {
    if version == 0 {
        return Err(CoordinatorError::Validation(
            "version must be a positive integer".to_string(),
        ));
    }
    Ok(())
}
