//! In-process task queue: tokio workers bounded by a semaphore, exponential
//! retry per task, and a settle hook once a task reaches a terminal state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, warn};

use crate::jobs::{RetryPolicy, Task};
use crate::traits::TaskQueue;

/// Executes tasks on behalf of a queue.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run one attempt. Follow-up work goes through `queue`.
    async fn run(&self, task: &Task, queue: &dyn TaskQueue) -> Result<()>;

    /// Called once per task after its last attempt, successful or not.
    async fn settle(&self, task: &Task, succeeded: bool, queue: &dyn TaskQueue) -> Result<()>;
}

struct QueueInner {
    runner: Arc<dyn TaskRunner>,
    workers: Semaphore,
    policy: RetryPolicy,
    in_flight: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub struct LocalQueue {
    inner: Arc<QueueInner>,
}

impl LocalQueue {
    pub fn new(runner: Arc<dyn TaskRunner>, concurrency: usize, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                runner,
                workers: Semaphore::new(concurrency.max(1)),
                policy,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Tasks enqueued and not yet settled.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve once every enqueued task, including follow-ups, has settled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn drive(&self, task: Task) {
        let succeeded = self.attempt_until_terminal(&task).await;

        if let Err(e) = self.inner.runner.settle(&task, succeeded, self).await {
            error!(task = task.name(), error = %e, "Failed to settle task");
        }

        // Follow-ups were enqueued before this point, so the counter only
        // reaches zero when the whole graph has drained.
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    async fn attempt_until_terminal(&self, task: &Task) -> bool {
        let policy = self.inner.policy;
        let mut attempt = 1;
        loop {
            let result = {
                let Ok(_permit) = self.inner.workers.acquire().await else {
                    error!(task = task.name(), "Worker pool closed");
                    return false;
                };
                self.inner.runner.run(task, self).await
            };

            match result {
                Ok(()) => return true,
                Err(e) if attempt < policy.max_attempts => {
                    let delay = policy.delay_after(attempt);
                    warn!(
                        task = task.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Task failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        task = task.name(),
                        attempt,
                        error = format!("{e:#}"),
                        "Task failed, retries exhausted"
                    );
                    return false;
                }
            }
        }
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    async fn enqueue(&self, task: Task) -> Result<()> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let queue = self.clone();
        tokio::spawn(async move { queue.drive(task).await });
        Ok(())
    }
}
