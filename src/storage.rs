//! Durable storage: the coordinator's view of it is a flat key-value
//! upsert/delete sink keyed by task id. `DurableStore` is the seam;
//! `InMemoryStore` backs tests and `PostgresStore` is a thin `sqlx`
//! implementation over a `tasks` table.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;

use crate::error::{CoordinatorError, Result};
use crate::model::{ColumnId, Task, TaskId};

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert(&self, task: &Task) -> Result<()>;
    async fn delete(&self, id: &TaskId) -> Result<()>;
    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;
    async fn list_all(&self) -> Result<Vec<Task>>;
    /// Bulk-upsert, used by the rebalance job so a column's new orders
    /// land durably in a single round trip.
    async fn bulk_upsert(&self, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            self.upsert(task).await?;
        }
        Ok(())
    }
}

/// In-memory reference implementation, used by tests and as the default
/// cold-start source when no `DATABASE_URL` durable backend is wired.
#[derive(Default)]
pub struct InMemoryStore {
    tasks: DashMap<TaskId, Task>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn upsert(&self, task: &Task) -> Result<()> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        self.tasks.remove(id);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(id).map(|t| t.clone()))
    }

    async fn list_all(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.iter().map(|e| e.value().clone()).collect())
    }
}

/// Postgres-backed durable store over the `tasks` table (indexed on
/// `(column_id, order asc)`, `updated_at` trigger-set).
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Clone of the underlying pool, handed to `PostgresAuditSink` so the
    /// audit writer shares the same connection pool as the task store.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    fn column_to_str(c: ColumnId) -> &'static str {
        match c {
            ColumnId::Todo => "todo",
            ColumnId::InProgress => "in-progress",
            ColumnId::Done => "done",
        }
    }

    fn str_to_column(s: &str) -> Result<ColumnId> {
        match s {
            "todo" => Ok(ColumnId::Todo),
            "in-progress" => Ok(ColumnId::InProgress),
            "done" => Ok(ColumnId::Done),
            other => Err(CoordinatorError::Storage(format!(
                "unknown column_id in storage row: {other}"
            ))),
        }
    }
}

#[async_trait]
impl DurableStore for PostgresStore {
    async fn upsert(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, column_id, title, description, "order", version,
                created_at, updated_at, creator_name, creator_color,
                updated_by_name, updated_by_color
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                column_id = EXCLUDED.column_id,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                "order" = EXCLUDED."order",
                version = EXCLUDED.version,
                updated_by_name = EXCLUDED.updated_by_name,
                updated_by_color = EXCLUDED.updated_by_color
            "#,
        )
        .bind(&task.id)
        .bind(Self::column_to_str(task.column_id))
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.order)
        .bind(task.version as i64)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(&task.creator_name)
        .bind(&task.creator_color)
        .bind(&task.updated_by_name)
        .bind(&task.updated_by_color)
        .execute(&self.pool)
        .await
        .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        row.map(|r| Self::row_to_task(&r)).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(r#"SELECT * FROM tasks ORDER BY column_id, "order" ASC"#)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        rows.iter().map(Self::row_to_task).collect()
    }
}

impl PostgresStore {
    fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task> {
        let column_id: String = row.try_get("column_id").map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(Task {
            id: row.try_get("id").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            column_id: Self::str_to_column(&column_id)?,
            title: row.try_get("title").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            description: row.try_get("description").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            order: row.try_get("order").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            version: row.try_get::<i64, _>("version").map_err(|e| CoordinatorError::Storage(e.to_string()))? as u64,
            created_at: row.try_get("created_at").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            updated_at: row.try_get("updated_at").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            creator_name: row.try_get("creator_name").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            creator_color: row.try_get("creator_color").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            updated_by_name: row.try_get("updated_by_name").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
            updated_by_color: row.try_get("updated_by_color").map_err(|e| CoordinatorError::Storage(e.to_string()))?,
        })
    }
}

pub type SharedStore = Arc<dyn DurableStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            column_id: ColumnId::Todo,
            title: "A".to_string(),
            description: String::new(),
            order: 0.5,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            creator_name: "alice".to_string(),
            creator_color: "#ff0000".to_string(),
            updated_by_name: "alice".to_string(),
            updated_by_color: "#ff0000".to_string(),
        }
    }

    #[tokio::test]
    async fn in_memory_store_roundtrips() {
        let store = InMemoryStore::new();
        let task = sample_task("t1");
        store.upsert(&task).await.unwrap();
        assert_eq!(store.get(&"t1".to_string()).await.unwrap().unwrap().id, "t1");
        store.delete(&"t1".to_string()).await.unwrap();
        assert!(store.get(&"t1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.delete(&"missing".to_string()).await.unwrap();
        store.delete(&"missing".to_string()).await.unwrap();
    }
}
