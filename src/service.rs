//! TaskService (C5): pure mutation logic — create/update/move/delete,
//! versioning, rebalance triggering. No transport coupling.

use chrono::Utc;
use std::sync::Arc;

use crate::cache::AuthoritativeCache;
use crate::error::{CoordinatorError, Result};
use crate::flush::FlushQueue;
use crate::model::{ColumnId, Task, TaskId};
use crate::order::{between, exhausted, Bound};

/// Author/mutator identity snapshot, carried alongside every mutation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub color: String,
}

pub struct CreateTaskInput {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub title: String,
    pub description: String,
    pub creator: Actor,
}

pub struct UpdateTaskInput {
    pub id: TaskId,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Tolerated per §4.5's version policy: mismatches are logged, not
    /// rejected.
    pub client_version: u64,
    pub actor: Actor,
}

pub struct MoveTaskInput {
    pub id: TaskId,
    pub column_id: ColumnId,
    pub order: f64,
    pub client_version: u64,
    pub actor: Actor,
}

pub struct TaskService {
    cache: Arc<AuthoritativeCache>,
    flush: Arc<FlushQueue>,
}

impl TaskService {
    pub fn new(cache: Arc<AuthoritativeCache>, flush: Arc<FlushQueue>) -> Self {
        Self { cache, flush }
    }

    /// Computes `order = between(maxOrderInColumn, unbounded)` for
    /// append-to-bottom semantics.
    pub async fn create_task(&self, input: CreateTaskInput) -> Result<Task> {
        let existing = self.cache.scan_column(input.column_id).await;
        let max_order = existing
            .iter()
            .map(|t| t.order)
            .fold(None, |acc: Option<f64>, o| match acc {
                Some(m) if m >= o => Some(m),
                _ => Some(o),
            });

        let prev = max_order.map(Bound::Value).unwrap_or(Bound::Unbounded);
        let order = between(prev, Bound::Unbounded)
            .map_err(|e| CoordinatorError::CreateFailed(e.to_string()))?;

        let now = Utc::now();
        let task = Task {
            id: input.id.clone(),
            column_id: input.column_id,
            title: input.title,
            description: input.description,
            order,
            version: 1,
            created_at: now,
            updated_at: now,
            creator_name: input.creator.name.clone(),
            creator_color: input.creator.color.clone(),
            updated_by_name: input.creator.name,
            updated_by_color: input.creator.color,
        };

        self.cache.put(task.clone()).await;
        self.flush.enqueue_upsert(task.id.clone());
        Ok(task)
    }

    /// Applies only `title`/`description`; position fields are untouched.
    /// A client-version mismatch does not reject the mutation — this is
    /// the field-level merge policy that lets a concurrent move and a
    /// concurrent edit both land.
    pub async fn update_task(&self, input: UpdateTaskInput) -> Result<Task> {
        let mut task = self
            .cache
            .get(&input.id)
            .await
            .map_err(|e| CoordinatorError::UpdateFailed(e.to_string()))?
            .ok_or_else(|| CoordinatorError::NotFound(input.id.clone()))?;

        if input.client_version != task.version {
            tracing::warn!(
                task_id = %task.id,
                client_version = input.client_version,
                server_version = task.version,
                "version mismatch on update tolerated by policy"
            );
        }

        if let Some(title) = input.title {
            task.title = title;
        }
        if let Some(description) = input.description {
            task.description = description;
        }
        task.version += 1;
        task.updated_at = Utc::now();
        task.updated_by_name = input.actor.name;
        task.updated_by_color = input.actor.color;

        self.cache.put(task.clone()).await;
        self.flush.enqueue_upsert(task.id.clone());
        Ok(task)
    }

    /// Read-only lookup used by callers (e.g. the event router) that need
    /// a task snapshot before deciding whether to proceed with a mutation.
    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.cache.get(id).await.map_err(|e| CoordinatorError::Storage(e.to_string()))
    }

    /// MUST be invoked with the per-task lock held by the caller. Updates
    /// only `columnId`/`order`. After the write, inspects
    /// neighbors in the new column and triggers a rebalance if either
    /// adjacent gap is exhausted.
    pub async fn move_task(&self, input: MoveTaskInput) -> Result<Task> {
        let mut task = self
            .cache
            .get(&input.id)
            .await
            .map_err(|e| CoordinatorError::MoveFailed(e.to_string()))?
            .ok_or_else(|| CoordinatorError::NotFound(input.id.clone()))?;

        if input.client_version != task.version {
            tracing::warn!(
                task_id = %task.id,
                client_version = input.client_version,
                server_version = task.version,
                "version mismatch on move tolerated by policy"
            );
        }

        let old_column = task.column_id;
        task.column_id = input.column_id;
        task.order = input.order;
        task.version += 1;
        task.updated_at = Utc::now();
        task.updated_by_name = input.actor.name;
        task.updated_by_color = input.actor.color;

        // put() already removes the id from the old column's set when the
        // column changed (AuthoritativeCache::put handles this atomically).
        let _ = old_column;
        self.cache.put(task.clone()).await;
        self.flush.enqueue_upsert(task.id.clone());

        if self.neighbor_gap_exhausted(input.column_id, &task).await {
            self.flush.enqueue_rebalance(input.column_id);
        }

        Ok(task)
    }

    async fn neighbor_gap_exhausted(&self, column_id: ColumnId, task: &Task) -> bool {
        let mut siblings = self.cache.scan_column(column_id).await;
        siblings.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));

        let idx = match siblings.iter().position(|t| t.id == task.id) {
            Some(i) => i,
            None => return false,
        };

        let prev_exhausted = idx
            .checked_sub(1)
            .and_then(|i| siblings.get(i))
            .map(|prev| exhausted(prev.order, task.order))
            .unwrap_or(false);
        let next_exhausted = siblings
            .get(idx + 1)
            .map(|next| exhausted(task.order, next.order))
            .unwrap_or(false);

        prev_exhausted || next_exhausted
    }

    /// Idempotent; a missing task returns success.
    pub async fn delete_task(&self, id: TaskId) -> Result<()> {
        self.cache.delete(&id).await;
        self.flush.enqueue_delete(id);
        Ok(())
    }

    /// Returns all tasks sorted by `(columnId, order)` — the shape
    /// consumed by the board snapshot.
    pub async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = self
            .cache
            .list_all()
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        tasks.sort_by(|a, b| {
            column_rank(a.column_id)
                .cmp(&column_rank(b.column_id))
                .then(a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal))
        });
        Ok(tasks)
    }
}

fn column_rank(c: ColumnId) -> u8 {
    match c {
        ColumnId::Todo => 0,
        ColumnId::InProgress => 1,
        ColumnId::Done => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn actor() -> Actor {
        Actor {
            name: "alice".to_string(),
            color: "#abc".to_string(),
        }
    }

    fn service() -> TaskService {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(AuthoritativeCache::new(store.clone()));
        let flush = FlushQueue::new(cache.clone(), store);
        TaskService::new(cache, flush)
    }

    #[tokio::test]
    async fn create_on_empty_board_appends_at_half() {
        let svc = service();
        let task = svc
            .create_task(CreateTaskInput {
                id: "a".to_string(),
                column_id: ColumnId::Todo,
                title: "A".to_string(),
                description: String::new(),
                creator: actor(),
            })
            .await
            .unwrap();
        assert_eq!(task.order, 0.5);
        assert_eq!(task.version, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let svc = service();
        svc.delete_task("missing".to_string()).await.unwrap();
        svc.delete_task("missing".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn update_not_found_errors() {
        let svc = service();
        let err = svc
            .update_task(UpdateTaskInput {
                id: "missing".to_string(),
                title: Some("x".to_string()),
                description: None,
                client_version: 1,
                actor: actor(),
            })
            .await;
        assert!(matches!(err, Err(CoordinatorError::NotFound(_))));
    }

    #[tokio::test]
    async fn move_and_update_converge_both_effects() {
        let svc = service();
        let created = svc
            .create_task(CreateTaskInput {
                id: "a".to_string(),
                column_id: ColumnId::Todo,
                title: "A".to_string(),
                description: String::new(),
                creator: actor(),
            })
            .await
            .unwrap();

        svc.move_task(MoveTaskInput {
            id: "a".to_string(),
            column_id: ColumnId::Done,
            order: 1.0,
            client_version: created.version,
            actor: actor(),
        })
        .await
        .unwrap();

        let after_move_and_edit = svc
            .update_task(UpdateTaskInput {
                id: "a".to_string(),
                title: Some("A2".to_string()),
                description: None,
                client_version: created.version,
                actor: actor(),
            })
            .await
            .unwrap();

        assert_eq!(after_move_and_edit.column_id, ColumnId::Done);
        assert_eq!(after_move_and_edit.title, "A2");
        assert_eq!(after_move_and_edit.version, created.version + 2);
    }

    #[tokio::test]
    async fn exhausted_neighbor_gap_triggers_rebalance() {
        let svc = service();
        svc.create_task(CreateTaskInput {
            id: "a".to_string(),
            column_id: ColumnId::Todo,
            title: "A".to_string(),
            description: String::new(),
            creator: actor(),
        })
        .await
        .unwrap();

        // Force a task to sit right next to "a" with a sub-exhaustion gap.
        svc.cache
            .put(Task {
                id: "b".to_string(),
                column_id: ColumnId::Todo,
                title: "B".to_string(),
                description: String::new(),
                order: 0.5 + 1e-10,
                version: 1,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                creator_name: "a".to_string(),
                creator_color: "#000".to_string(),
                updated_by_name: "a".to_string(),
                updated_by_color: "#000".to_string(),
            })
            .await;

        svc.move_task(MoveTaskInput {
            id: "b".to_string(),
            column_id: ColumnId::Todo,
            order: 0.5 + 1e-10,
            client_version: 1,
            actor: actor(),
        })
        .await
        .unwrap();

        tokio::time::sleep(crate::flush::FLUSH_DELAY + std::time::Duration::from_millis(200)).await;

        let tasks = svc.cache.scan_column(ColumnId::Todo).await;
        let mut orders: Vec<f64> = tasks.iter().map(|t| t.order).collect();
        orders.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(orders, vec![1000.0, 2000.0]);
    }
}
