//! Periodic discovery. Each tick lists today's releases (portal time) and
//! dispatches the new ones; a failing listing call is retried with
//! exponential backoff before the tick is given up. The tick then re-dispatches
//! documents that stalled before becoming ready.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use pressroom_common::config::SchedulerConfig;

use crate::pipeline::{DiscoveryOutcome, DiscoveryRequest, Pipeline};
use crate::traits::TaskQueue;

/// IST, the portal's publishing timezone.
const PORTAL_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Calendar date on the portal for a UTC instant.
pub fn portal_date(now: DateTime<Utc>) -> NaiveDate {
    match FixedOffset::east_opt(PORTAL_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}

pub fn today_ist() -> NaiveDate {
    portal_date(Utc::now())
}

pub struct DiscoveryScheduler {
    pipeline: Arc<Pipeline>,
    queue: Arc<dyn TaskQueue>,
    config: SchedulerConfig,
}

impl DiscoveryScheduler {
    pub fn new(pipeline: Arc<Pipeline>, queue: Arc<dyn TaskQueue>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            queue,
            config,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.discovery_backoff_secs.max(1);
        Duration::from_secs(base.saturating_mul(1u64 << attempt.saturating_sub(1).min(16)))
    }

    /// Run one discovery pass, retrying the whole pass when the listing
    /// call fails.
    pub async fn discover_with_retry(&self, request: &DiscoveryRequest) -> Result<DiscoveryOutcome> {
        let max_attempts = self.config.discovery_max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.pipeline.discover(request, self.queue.as_ref()).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        date = %request.date,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = format!("{e:#}"),
                        "Discovery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Re-dispatch documents that have been unready for longer than the
    /// grace period. Returns how many were dispatched.
    pub async fn resume_stalled(&self) -> usize {
        let grace = i64::try_from(self.config.resume_grace_secs).unwrap_or(i64::MAX);
        let cutoff = TimeDelta::try_seconds(grace)
            .and_then(|grace| Utc::now().checked_sub_signed(grace))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        match self.pipeline.resume_stalled(cutoff, self.queue.as_ref()).await {
            Ok(0) => 0,
            Ok(resumed) => {
                info!(resumed, "Re-dispatched stalled documents");
                resumed
            }
            Err(e) => {
                error!(error = format!("{e:#}"), "Resume sweep failed");
                0
            }
        }
    }

    /// One scheduled pass: today's discovery, then the resume sweep.
    pub async fn run_tick(&self) {
        let request = DiscoveryRequest::for_date(today_ist());
        if let Err(e) = self.discover_with_retry(&request).await {
            error!(date = %request.date, error = format!("{e:#}"), "Discovery gave up for this tick");
        }
        self.resume_stalled().await;
    }

    /// Tick until `shutdown` resolves. The first pass runs immediately, and a
    /// pass still waiting out a retry is abandoned on shutdown.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = self.config.interval_secs, "Discovery scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.run_tick() => {}
                    }
                }
            }
        }
        info!("Discovery scheduler stopping");
    }
}
