//! The orchestrator: discovery → per-document generation → translation
//! fan-out → readiness barrier.
//!
//! Every step converges under at-least-once delivery. Documents are
//! create-if-absent on their source URL, variants are written only when the
//! (document, language, kind) unit is absent, and readiness is a single
//! monotonic flag. Nothing takes a lock across steps.

pub mod discovery;
pub mod finalize;
pub mod process;
pub mod translate;

use anyhow::Result;
use async_trait::async_trait;

use crate::deps::PipelineDeps;
use crate::jobs::Task;
use crate::queue::TaskRunner;
use crate::traits::TaskQueue;

pub use discovery::{DiscoveryOutcome, DiscoveryRequest};
pub use process::ProcessOutcome;
pub use translate::{BatchOutcome, TranslateOutcome};

pub struct Pipeline {
    deps: PipelineDeps,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }
}

#[async_trait]
impl TaskRunner for Pipeline {
    async fn run(&self, task: &Task, queue: &dyn TaskQueue) -> Result<()> {
        match task {
            Task::ProcessDocument {
                url,
                ministry,
                published_at,
                origin_office,
            } => {
                let defaults = process::SourceDefaults {
                    published_at: *published_at,
                    origin_office: origin_office.clone(),
                };
                self.process_document(url, ministry, defaults, queue).await?;
            }
            Task::TranslateText {
                document_id,
                language,
                kind,
                text,
                title,
                ..
            } => {
                self.translate_and_save(*document_id, *language, *kind, text, title.as_deref())
                    .await?;
            }
            Task::TranslateBatch {
                document_id,
                language,
                kind,
                items,
                translate,
                ..
            } => {
                self.translate_batch_and_save(*document_id, *language, *kind, items, *translate)
                    .await?;
            }
            Task::Finalize { document_id } => {
                self.finalize(*document_id).await?;
            }
        }
        Ok(())
    }

    async fn settle(&self, task: &Task, succeeded: bool, queue: &dyn TaskQueue) -> Result<()> {
        if let Some(job_id) = task.job_id() {
            self.leaf_settled(job_id, succeeded, queue).await?;
        }
        Ok(())
    }
}
