use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::jobs::Task;
use crate::traits::TaskQueue;

use super::Pipeline;

/// One discovery pass. `limit` caps how many new documents are dispatched;
/// `url` narrows the pass to a single listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub date: NaiveDate,
    pub limit: Option<usize>,
    pub url: Option<String>,
}

impl DiscoveryRequest {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            limit: None,
            url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    pub listed: usize,
    pub already_known: usize,
    pub dispatched: usize,
    pub dispatch_failed: usize,
}

impl Pipeline {
    /// List releases and dispatch one `ProcessDocument` per unknown URL.
    ///
    /// A failing listing call fails the whole pass so the caller can retry
    /// it. Per-document problems after that point never stop siblings.
    pub async fn discover(&self, request: &DiscoveryRequest, queue: &dyn TaskQueue) -> Result<DiscoveryOutcome> {
        let releases = self
            .deps
            .source
            .discover(request.date)
            .await
            .with_context(|| format!("discovery for {} failed", request.date))?;

        let mut outcome = DiscoveryOutcome {
            listed: releases.len(),
            ..DiscoveryOutcome::default()
        };

        for release in releases {
            if request.url.as_deref().is_some_and(|u| u != release.url) {
                continue;
            }
            if request.limit.is_some_and(|limit| outcome.dispatched >= limit) {
                break;
            }

            match self.deps.registry.document_exists(&release.url).await {
                Ok(true) => {
                    info!(url = release.url.as_str(), "Already ingested, skipping");
                    outcome.already_known += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(url = release.url.as_str(), error = %e, "Existence check failed, skipping");
                    outcome.dispatch_failed += 1;
                    continue;
                }
            }

            match queue.enqueue(Task::process(&release.url, &release.ministry)).await {
                Ok(()) => outcome.dispatched += 1,
                Err(e) => {
                    error!(url = release.url.as_str(), error = %e, "Failed to dispatch document");
                    outcome.dispatch_failed += 1;
                }
            }
        }

        info!(
            date = %request.date,
            listed = outcome.listed,
            already_known = outcome.already_known,
            dispatched = outcome.dispatched,
            "Discovery pass complete"
        );
        Ok(outcome)
    }
}

impl Pipeline {
    /// Re-dispatch documents created before `created_before` that never
    /// became ready. Covers fan-outs lost with a crashed worker and
    /// `ProcessDocument` tasks that exhausted their retries after the row was
    /// written. Replay skips every unit already stored.
    pub async fn resume_stalled(&self, created_before: DateTime<Utc>, queue: &dyn TaskQueue) -> Result<usize> {
        let stalled = self
            .deps
            .registry
            .unready_documents(created_before)
            .await
            .context("listing unready documents failed")?;

        let mut dispatched = 0;
        for document in stalled {
            let ministry = match self.deps.registry.get_ministry(document.ministry_id).await {
                Ok(Some(ministry)) => ministry,
                Ok(None) => {
                    warn!(document_id = %document.id, "Ministry missing, cannot resume");
                    continue;
                }
                Err(e) => {
                    error!(document_id = %document.id, error = %e, "Ministry lookup failed");
                    continue;
                }
            };

            let task = Task::ProcessDocument {
                url: document.source_url.clone(),
                ministry: ministry.name,
                published_at: Some(document.published_at),
                origin_office: document.origin_office.clone(),
            };
            match queue.enqueue(task).await {
                Ok(()) => {
                    info!(document_id = %document.id, url = document.source_url.as_str(), "Resuming unfinished document");
                    dispatched += 1;
                }
                Err(e) => error!(document_id = %document.id, error = %e, "Failed to dispatch resume"),
            }
        }
        Ok(dispatched)
    }
}
