//! Per-connection event dispatch: the handler table that turns a validated
//! `ClientEvent` into a mutation plus the right fan-out.

use dashmap::DashMap;
use std::sync::Arc;

use crate::audit::{record_fire_and_forget, AuditSink};
use crate::broadcast::Broadcaster;
use crate::conflict::{build_audit_record, ConflictClass, ConflictNotify};
use crate::error::CoordinatorError;
use crate::events::{validate, ClientEvent, ServerEvent};
use crate::lock::LockManager;
use crate::model::{new_process_owner_id, ColumnId, PresenceStatus, QueuedOp, TaskId};
use crate::presence::PresenceRegistry;
use crate::service::{Actor, CreateTaskInput, MoveTaskInput, TaskService, UpdateTaskInput};

/// Connection and target column of an in-flight `TASK_MOVE`, tracked purely
/// for audit/observability readability; the lock itself lives in `locks`.
struct ActiveMove {
    conn_id: String,
    column_id: ColumnId,
}

pub struct EventRouter {
    service: Arc<TaskService>,
    locks: Arc<LockManager>,
    presence: Arc<PresenceRegistry>,
    audit: Arc<dyn AuditSink>,
    broadcaster: Arc<Broadcaster>,
    active_movers: DashMap<TaskId, ActiveMove>,
}

impl EventRouter {
    pub fn new(
        service: Arc<TaskService>,
        locks: Arc<LockManager>,
        presence: Arc<PresenceRegistry>,
        audit: Arc<dyn AuditSink>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            service,
            locks,
            presence,
            audit,
            broadcaster,
            active_movers: DashMap::new(),
        }
    }

    /// Validates, then dispatches. `REPLAY_OPS` is handled specially here
    /// since it fans out into many dispatches of its own; every other
    /// variant goes straight to `dispatch`.
    pub async fn handle(&self, conn_id: &str, actor: Actor, event: ClientEvent) {
        if let Err(e) = validate(&event) {
            self.send_error(conn_id, e);
            return;
        }
        match event {
            ClientEvent::ReplayOps(ops) => self.handle_replay(conn_id, actor, ops).await,
            other => self.dispatch(conn_id, actor, other).await,
        }
    }

    async fn dispatch(&self, conn_id: &str, actor: Actor, event: ClientEvent) {
        match event {
            ClientEvent::TaskCreate(p) => {
                if self.active_movers.iter().any(|e| e.value().column_id == p.column_id) {
                    tracing::info!(
                        column_id = ?p.column_id,
                        class = ?ConflictClass::ReorderInsert,
                        "insert landing in a column with an in-flight move; resolved structurally by fractional order"
                    );
                }
                match self
                    .service
                    .create_task(CreateTaskInput {
                        id: p.id,
                        column_id: p.column_id,
                        title: p.title,
                        description: p.description,
                        creator: actor,
                    })
                    .await
                {
                    Ok(task) => self.broadcaster.broadcast(ServerEvent::TaskCreated(task)),
                    Err(e) => self.send_error(conn_id, e),
                }
            }
            ClientEvent::TaskUpdate(p) => {
                if self.active_movers.contains_key(&p.id) {
                    tracing::info!(
                        task_id = %p.id,
                        class = ?ConflictClass::MoveEdit,
                        "edit arriving while a move is in flight; both effects converge via field-level merge"
                    );
                }
                match self
                    .service
                    .update_task(UpdateTaskInput {
                        id: p.id,
                        title: p.title,
                        description: p.description,
                        client_version: p.version,
                        actor,
                    })
                    .await
                {
                    Ok(task) => self.broadcaster.broadcast(ServerEvent::TaskUpdated(task)),
                    Err(e) => self.send_error(conn_id, e),
                }
            }
            ClientEvent::TaskMove(p) => {
                self.handle_move(conn_id, actor, p.id, p.column_id, p.order, p.version).await;
            }
            ClientEvent::TaskDelete(p) => match self.service.delete_task(p.id.clone()).await {
                Ok(()) => self.broadcaster.broadcast(ServerEvent::TaskDeleted { id: p.id }),
                Err(e) => self.send_error(conn_id, e),
            },
            ClientEvent::PresenceUpdate(p) => {
                let editing_task_id = match p.status {
                    PresenceStatus::Editing => p.task_id,
                    PresenceStatus::Idle => None,
                };
                if self.presence.update(conn_id, editing_task_id).is_some() {
                    self.broadcaster
                        .broadcast(ServerEvent::PresenceState(self.presence.list_active()));
                }
            }
            ClientEvent::ReplayOps(_) => {
                // handle() only ever routes REPLAY_OPS to handle_replay, and
                // replayed ops never themselves carry a nested REPLAY_OPS.
            }
        }
    }

    /// Lock-guarded move: the lock loser gets a private `CONFLICT_NOTIFY`
    /// carrying the winner's resolved state, plus a fire-and-forget audit
    /// row. The lock is released on every exit path, success or failure.
    async fn handle_move(
        &self,
        conn_id: &str,
        actor: Actor,
        task_id: TaskId,
        column_id: crate::model::ColumnId,
        order: f64,
        version: u64,
    ) {
        let current_state = match self.service.get_task(&task_id).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                self.send_error(conn_id, CoordinatorError::NotFound(task_id));
                return;
            }
            Err(e) => {
                self.send_error(conn_id, e);
                return;
            }
        };

        let owner_id = new_process_owner_id();
        let acquire = self.locks.acquire(&task_id, owner_id, Some(current_state.clone()));
        if !acquire.acquired {
            let winner_conn = self
                .active_movers
                .get(&task_id)
                .map(|e| e.value().conn_id.clone())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::info!(
                task_id = %task_id,
                class = ?ConflictClass::MoveMove,
                loser = %conn_id,
                winner = %winner_conn,
                "concurrent move lost the lock race"
            );
            // Re-read fresh: the winner's move may already have landed, so the
            // loser's own pre-acquire snapshot (stale by definition) is never
            // an authoritative resolution — only a current read is.
            let resolved = match self.service.get_task(&task_id).await {
                Ok(Some(t)) => t,
                Ok(None) | Err(_) => current_state,
            };
            let notify = ConflictNotify::new(resolved.clone());
            let record = build_audit_record(
                "TASK_MOVE",
                "TASK_MOVE",
                &winner_conn,
                conn_id,
                resolved,
                notify.message.clone(),
            );
            record_fire_and_forget(self.audit.clone(), record);
            self.broadcaster.send_private(conn_id, ServerEvent::ConflictNotify(notify));
            return;
        }

        self.active_movers.insert(
            task_id.clone(),
            ActiveMove {
                conn_id: conn_id.to_string(),
                column_id,
            },
        );
        let result = self
            .service
            .move_task(MoveTaskInput {
                id: task_id.clone(),
                column_id,
                order,
                client_version: version,
                actor,
            })
            .await;
        self.locks.release(&task_id, owner_id);
        self.active_movers.remove(&task_id);

        match result {
            Ok(task) => self.broadcaster.broadcast(ServerEvent::TaskMoved(task)),
            Err(e) => self.send_error(conn_id, e),
        }
    }

    /// Sorts buffered offline ops by `clientTimestamp` ascending and
    /// dispatches each through the same handler chain as a live event,
    /// dropping `PRESENCE_UPDATE` entries (stale by the time they replay).
    async fn handle_replay(&self, conn_id: &str, actor: Actor, mut ops: Vec<QueuedOp>) {
        ops.sort_by_key(|op| op.client_timestamp);
        for op in ops {
            if op.op_type == "PRESENCE_UPDATE" {
                continue;
            }
            let wire = serde_json::json!({ "type": op.op_type, "payload": op.payload });
            match serde_json::from_value::<ClientEvent>(wire) {
                Ok(event) => {
                    if let Err(e) = validate(&event) {
                        self.send_error(conn_id, e);
                        continue;
                    }
                    self.dispatch(conn_id, actor.clone(), event).await;
                }
                Err(_) => self.send_error(
                    conn_id,
                    CoordinatorError::Validation(format!("malformed queued op: {}", op.op_type)),
                ),
            }
        }
    }

    fn send_error(&self, conn_id: &str, err: CoordinatorError) {
        self.broadcaster.send_private(
            conn_id,
            ServerEvent::Error {
                code: err.code(),
                message: err.message(),
            },
        );
    }
}
