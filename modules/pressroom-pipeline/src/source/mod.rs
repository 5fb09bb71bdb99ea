pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use pressroom_common::config::SourceConfig;
use pressroom_common::{DiscoveredRelease, FetchedContent, PressroomError};

use crate::traits::ContentSource;
pub use parser::{parse_dateline, PageParser, SelectorParser};

const RETRY_STATUSES: [StatusCode; 4] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Content source that talks HTTP to the press-release portal.
///
/// Owns transport only: a fixed per-request timeout and bounded retry with
/// exponential backoff on 5xx and connection failures. Markup handling is
/// the parser's job.
pub struct HttpContentSource {
    client: reqwest::Client,
    config: SourceConfig,
    parser: Arc<dyn PageParser>,
}

impl HttpContentSource {
    pub fn new(config: SourceConfig, parser: Arc<dyn PageParser>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("pressroom/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            parser,
        })
    }

    /// Build with the selector parser described by the config.
    pub fn from_config(config: SourceConfig) -> Result<Self> {
        let parser = SelectorParser::new(&config.selectors, &config.base_url)?;
        Self::new(config, Arc::new(parser))
    }

    /// Delay before retry number `retry` (1-based): `factor * 2^(retry-1)` seconds.
    fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        Duration::from_secs_f64((self.config.backoff_factor * 2f64.powi(exponent)).max(0.0))
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<String, PressroomError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut retry = 0u32;
        loop {
            let failure = match build().send().await {
                Ok(response) if response.status().is_success() => {
                    return response.text().await.map_err(|e| fetch_error(url, e));
                }
                Ok(response) if RETRY_STATUSES.contains(&response.status()) => {
                    format!("HTTP {}", response.status())
                }
                Ok(response) => {
                    return Err(fetch_error(url, format!("HTTP {}", response.status())));
                }
                Err(e) if e.is_connect() || e.is_timeout() => e.to_string(),
                Err(e) => return Err(fetch_error(url, e)),
            };

            if retry >= self.config.max_retries {
                return Err(fetch_error(url, failure));
            }
            retry += 1;
            let jitter = Duration::from_millis(rand::rng().random_range(0..250));
            let delay = self.backoff(retry) + jitter;
            warn!(url, retry, delay_ms = delay.as_millis() as u64, error = failure.as_str(), "Transient fetch failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

fn fetch_error(url: &str, reason: impl std::fmt::Display) -> PressroomError {
    PressroomError::SourceFetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Substitute `{day}`, `{month}` and `{year}` (no zero padding).
pub fn fill_date(template: &str, date: NaiveDate) -> String {
    template
        .replace("{day}", &date.day().to_string())
        .replace("{month}", &date.month().to_string())
        .replace("{year}", &date.year().to_string())
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn discover(&self, date: NaiveDate) -> Result<Vec<DiscoveredRelease>> {
        let url = fill_date(&self.config.listing_url, date);
        let form: Vec<(String, String)> = self
            .config
            .listing_form
            .iter()
            .map(|(k, v)| (k.clone(), fill_date(v, date)))
            .collect();

        let html = if form.is_empty() {
            self.send_with_retry(&url, || self.client.get(&url)).await?
        } else {
            self.send_with_retry(&url, || self.client.post(&url).form(&form)).await?
        };

        let releases = self.parser.parse_listing(&html);
        info!(%date, count = releases.len(), "Listing parsed");
        Ok(releases)
    }

    async fn fetch(&self, url: &str) -> Result<Option<FetchedContent>> {
        let html = self.send_with_retry(url, || self.client.get(url)).await?;
        let content = self.parser.parse_release(&html);
        if content.is_none() {
            debug!(url, "Release page has no content element");
        }
        Ok(content)
    }
}
