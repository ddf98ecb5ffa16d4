//! Append-only conflict audit trail. Writes are fire-and-forget — never on
//! the critical path of a mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Task, TaskId};

/// One row of `conflict_audit_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictAuditRecord {
    pub id: Uuid,
    pub task_id: TaskId,
    pub winner_event: String,
    pub loser_event: String,
    pub winner_id: String,
    pub loser_id: String,
    pub resolved_state: Task,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: ConflictAuditRecord) -> Result<()>;
}

/// Spawns the write onto a background task so a slow or failing audit
/// backend never blocks the caller.
pub fn record_fire_and_forget(sink: Arc<dyn AuditSink>, record: ConflictAuditRecord) {
    tokio::spawn(async move {
        if let Err(e) = sink.record(record).await {
            error!(error = %e, "conflict audit write failed; logged only, not retried");
        }
    });
}

#[derive(Default)]
pub struct InMemoryAuditSink {
    records: dashmap::DashMap<Uuid, ConflictAuditRecord>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: ConflictAuditRecord) -> Result<()> {
        self.records.insert(record.id, record);
        Ok(())
    }
}

pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, record: ConflictAuditRecord) -> Result<()> {
        let resolved_state = serde_json::to_value(&record.resolved_state)
            .map_err(|e| crate::error::CoordinatorError::Storage(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO conflict_audit_log (
                id, task_id, winner_event, loser_event, winner_user_id,
                loser_user_id, resolved_state, resolution_msg, conflict_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.task_id)
        .bind(&record.winner_event)
        .bind(&record.loser_event)
        .bind(&record.winner_id)
        .bind(&record.loser_id)
        .bind(resolved_state)
        .bind(&record.message)
        .bind(record.at)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::error::CoordinatorError::Storage(e.to_string()))?;
        Ok(())
    }
}
