use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::error::PressroomError;
use crate::types::Language;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

// =============================================================================
// Environment (secrets)
// =============================================================================

/// Secrets and connection strings, loaded from the environment.
/// Everything else lives in [`FileConfig`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Postgres connection string. `None` runs against the in-memory registry.
    pub database_url: Option<String>,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,

    pub openai_api_key: Option<String>,
    pub openai_model: String,

    /// Endpoint override for the selected provider, e.g. a gateway.
    pub llm_base_url: Option<String>,
    /// Per-request timeout for the selected provider.
    pub llm_timeout: Option<Duration>,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            database_url: optional_env("DATABASE_URL"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            gemini_model: optional_env("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            anthropic_model: optional_env("ANTHROPIC_MODEL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_model: optional_env("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            llm_base_url: optional_env("LLM_BASE_URL"),
            llm_timeout: optional_env("LLM_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
        }
    }

    pub fn require_database_url(&self) -> Result<&str, PressroomError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| PressroomError::Config("DATABASE_URL is not set".into()))
    }

    /// Log which settings are present without printing their values.
    pub fn log_redacted(&self) {
        info!(
            database_url = redact(&self.database_url),
            gemini_api_key = redact(&self.gemini_api_key),
            gemini_model = self.gemini_model.as_str(),
            anthropic_api_key = redact(&self.anthropic_api_key),
            anthropic_model = self.anthropic_model.as_str(),
            openai_api_key = redact(&self.openai_api_key),
            openai_model = self.openai_model.as_str(),
            llm_base_url = self.llm_base_url.as_deref().unwrap_or("[default]"),
            llm_timeout_secs = self.llm_timeout.map(|t| t.as_secs()),
            "Loaded configuration"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "[set]"
    } else {
        "[unset]"
    }
}

// =============================================================================
// TOML file
// =============================================================================

/// Non-secret settings. Every section has defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub pipeline: PipelineConfig,
    pub rate_limit: RateLimitConfig,
    pub translation: TranslationConfig,
    pub source: SourceConfig,
    pub scheduler: SchedulerConfig,
    /// Replacement ministry table. The built-in table is used when unset.
    pub taxonomy_path: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PressroomError> {
        if self.rate_limit.capacity == 0 {
            return Err(PressroomError::Config("rate_limit.capacity must be > 0".into()));
        }
        if self.rate_limit.refill_per_second <= 0.0 {
            return Err(PressroomError::Config(
                "rate_limit.refill_per_second must be > 0".into(),
            ));
        }
        if self.pipeline.worker_concurrency == 0 {
            return Err(PressroomError::Config(
                "pipeline.worker_concurrency must be > 0".into(),
            ));
        }
        if self.pipeline.task_max_attempts == 0 || self.translation.max_attempts == 0 {
            return Err(PressroomError::Config("max attempts must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub source_language: Language,
    /// Every language content is produced in. The source language may be
    /// listed or not; it is never a translation target.
    pub languages: Vec<Language>,
    pub worker_concurrency: usize,
    pub task_max_attempts: u32,
    pub task_initial_backoff_secs: u64,
    /// Append-only journal for unparseable model output.
    pub malformed_output_log: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_language: Language::En,
            languages: Language::ALL.to_vec(),
            worker_concurrency: 8,
            task_max_attempts: 3,
            task_initial_backoff_secs: 5,
            malformed_output_log: None,
        }
    }
}

impl PipelineConfig {
    pub fn target_languages(&self) -> Vec<Language> {
        let mut targets: Vec<Language> = Vec::new();
        for lang in &self.languages {
            if *lang != self.source_language && !targets.contains(lang) {
                targets.push(*lang);
            }
        }
        targets
    }

    pub fn task_initial_backoff(&self) -> Duration {
        Duration::from_secs(self.task_initial_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    /// Burst size: how many calls may go out back to back.
    pub capacity: u32,
    /// Sustained rate, independent of `capacity`.
    pub refill_per_second: f64,
    /// Wait after the provider itself reports rate limiting.
    pub rate_limited_backoff_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 950,
            refill_per_second: 950.0 / 60.0,
            rate_limited_backoff_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn rate_limited_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limited_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TranslationConfig {
    pub max_attempts: u32,
    pub min_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff_secs: 4,
            max_backoff_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceConfig {
    /// Listing page. `{day}`, `{month}` and `{year}` are substituted.
    pub listing_url: String,
    /// Form fields posted to the listing page. Empty means a plain GET.
    /// Values get the same placeholder substitution as `listing_url`.
    pub listing_form: Vec<(String, String)>,
    /// Prefix for relative release links.
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub selectors: SelectorConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://www.pib.gov.in/Allrel.aspx".to_string(),
            listing_form: vec![
                (
                    "ctl00$ContentPlaceHolder1$ddlday".to_string(),
                    "{day}".to_string(),
                ),
                (
                    "ctl00$ContentPlaceHolder1$ddlMonth".to_string(),
                    "{month}".to_string(),
                ),
                (
                    "ctl00$ContentPlaceHolder1$ddlYear".to_string(),
                    "{year}".to_string(),
                ),
            ],
            base_url: "https://www.pib.gov.in".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            backoff_factor: 0.3,
            selectors: SelectorConfig::default(),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// CSS selectors that describe the portal's markup.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SelectorConfig {
    /// One element per ministry block on the listing page. Links are only
    /// attributed to the name found inside the same block.
    pub ministry_group: String,
    /// Ministry name, relative to a group.
    pub ministry_name: String,
    /// Release links, relative to a group.
    pub release_link: String,
    /// Attribute holding the release title. Falls back to the link text.
    pub title_attr: String,
    /// Release body on a detail page.
    pub content: String,
    /// Element holding the "Posted On: ... by PIB <office>" line.
    pub dateline: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            ministry_group: "div.content-area > ul > li".to_string(),
            ministry_name: "h3".to_string(),
            release_link: "li > ul > li a".to_string(),
            title_attr: "title".to_string(),
            content: "div.innner-page-main-about-us-content-right-part".to_string(),
            dateline: "#PrDateTime".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub discovery_max_attempts: u32,
    pub discovery_backoff_secs: u64,
    /// Unready documents older than this are re-dispatched on every tick.
    pub resume_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            discovery_max_attempts: 5,
            discovery_backoff_secs: 30,
            resume_grace_secs: 3600,
        }
    }
}
