//! FlushQueue (C4): debounced, de-duplicated write-behind to durable
//! storage. Jobs are keyed per task id so a burst of enqueues against the
//! same id collapses to one execution of the *latest* state, rather than
//! one execution per enqueue.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::cache::AuthoritativeCache;
use crate::model::{ColumnId, TaskId};
use crate::order::rebalanced;
use crate::storage::SharedStore;

/// Each job executes no sooner than this long after its *last* enqueue.
pub const FLUSH_DELAY: Duration = Duration::from_millis(500);

/// Worker pool width: colliding jobs share an id and serialize naturally
/// via the generation check below, so this only bounds how many distinct
/// ids may flush concurrently.
const WORKER_POOL_SIZE: usize = 5;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JobKind {
    Upsert(TaskId),
    Delete(TaskId),
    Rebalance(ColumnId),
}

impl JobKind {
    fn job_id(&self) -> String {
        match self {
            JobKind::Upsert(id) | JobKind::Delete(id) => format!("task_{id}"),
            JobKind::Rebalance(col) => format!("rebalance_{col:?}"),
        }
    }
}

/// Write-behind job queue. Jobs coalesce under a deterministic id so a
/// drag burst collapses to a single durable write.
pub struct FlushQueue {
    cache: Arc<AuthoritativeCache>,
    store: SharedStore,
    generations: dashmap::DashMap<String, u64>,
    semaphore: Arc<Semaphore>,
}

impl FlushQueue {
    pub fn new(cache: Arc<AuthoritativeCache>, store: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            cache,
            store,
            generations: dashmap::DashMap::new(),
            semaphore: Arc::new(Semaphore::new(WORKER_POOL_SIZE)),
        })
    }

    pub fn enqueue_upsert(self: &Arc<Self>, id: TaskId) {
        self.enqueue(JobKind::Upsert(id));
    }

    pub fn enqueue_delete(self: &Arc<Self>, id: TaskId) {
        self.enqueue(JobKind::Delete(id));
    }

    pub fn enqueue_rebalance(self: &Arc<Self>, column_id: ColumnId) {
        self.enqueue(JobKind::Rebalance(column_id));
    }

    fn enqueue(self: &Arc<Self>, job: JobKind) {
        let job_id = job.job_id();
        let generation = {
            let mut entry = self.generations.entry(job_id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            sleep(FLUSH_DELAY).await;

            // Superseded by a later enqueue of the same job id: let that
            // one win and execute instead.
            let still_current = this
                .generations
                .get(&job_id)
                .map(|g| *g == generation)
                .unwrap_or(false);
            if !still_current {
                return;
            }

            let _permit = this.semaphore.acquire().await.expect("semaphore not closed");
            this.run_with_retry(job).await;
        });
    }

    async fn run_with_retry(&self, job: JobKind) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute(&job).await {
                Ok(()) => return,
                Err(e) if attempt >= MAX_ATTEMPTS => {
                    error!(job = ?job, attempt, error = %e, "flush job permanently failed; cache remains authoritative until reconciliation");
                    return;
                }
                Err(e) => {
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                    warn!(job = ?job, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "flush job failed, retrying");
                    sleep(backoff).await;
                }
            }
        }
    }

    async fn execute(&self, job: &JobKind) -> crate::error::Result<()> {
        match job {
            JobKind::Upsert(id) => {
                // Reads the *current* cache state, not the enqueue-time
                // snapshot, so the latest drag position always wins.
                if let Some(task) = self.cache.get(id).await? {
                    self.store.upsert(&task).await?;
                }
                Ok(())
            }
            JobKind::Delete(id) => self.store.delete(id).await,
            JobKind::Rebalance(column_id) => self.execute_rebalance(*column_id).await,
        }
    }

    async fn execute_rebalance(&self, column_id: ColumnId) -> crate::error::Result<()> {
        let mut tasks = self.cache.scan_column(column_id).await;
        tasks.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));

        let new_orders = rebalanced(tasks.len());
        for (task, order) in tasks.iter_mut().zip(new_orders) {
            task.order = order;
        }

        self.store.bulk_upsert(&tasks).await?;
        for task in tasks {
            self.cache.put(task).await;
        }
        Ok(())
    }
}
