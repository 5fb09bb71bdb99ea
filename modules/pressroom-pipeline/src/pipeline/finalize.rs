use anyhow::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::Task;
use crate::traits::TaskQueue;

use super::Pipeline;

impl Pipeline {
    /// Set the readiness flag. Idempotent; returns `true` for the call that
    /// flipped it.
    pub async fn finalize(&self, document_id: Uuid) -> Result<bool> {
        let flipped = self.deps.registry.mark_ready(document_id).await?;
        if flipped {
            let languages = self.deps.registry.available_languages(document_id).await?;
            info!(
                %document_id,
                languages = languages.len(),
                "Document ready"
            );
        }
        Ok(flipped)
    }

    /// Open a fan-out job for `leaves` and dispatch them.
    ///
    /// A leaf that cannot be enqueued is counted as terminal right away, so
    /// the barrier still closes.
    pub(crate) async fn dispatch_fan_out(
        &self,
        document_id: Uuid,
        leaves: Vec<Task>,
        queue: &dyn TaskQueue,
    ) -> Result<Uuid> {
        let fan_out = u32::try_from(leaves.len())?;
        let job_id = self.deps.ledger.open_job(document_id, fan_out).await?;

        for leaf in leaves {
            let leaf = leaf.with_job(job_id);
            let name = leaf.name();
            if let Err(e) = queue.enqueue(leaf).await {
                error!(%document_id, task = name, error = %e, "Failed to enqueue leaf, counting it as settled");
                self.leaf_settled(job_id, false, queue).await?;
            }
        }

        Ok(job_id)
    }

    /// Record a terminal leaf. The leaf that completes the job triggers
    /// finalization; every other leaf returns quietly.
    pub(crate) async fn leaf_settled(&self, job_id: Uuid, succeeded: bool, queue: &dyn TaskQueue) -> Result<()> {
        let progress = self.deps.ledger.record_leaf(job_id).await?;
        if !succeeded {
            warn!(%job_id, document_id = %progress.document_id, "Leaf settled after exhausting retries");
        }
        if !progress.is_complete() {
            return Ok(());
        }

        info!(%job_id, document_id = %progress.document_id, fan_out = progress.fan_out, "Fan-out complete");
        let finalize = Task::Finalize {
            document_id: progress.document_id,
        };
        if let Err(e) = queue.enqueue(finalize).await {
            warn!(%job_id, error = %e, "Could not enqueue finalize, running inline");
            self.finalize(progress.document_id).await?;
        }
        Ok(())
    }
}
