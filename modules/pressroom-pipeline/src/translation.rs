use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use pressroom_common::config::TranslationConfig;
use pressroom_common::{Language, PressroomError};

use crate::generation::parse::{parse_model_output, ParsedOutput};
use crate::generation::prompts::{translation_system_prompt, translation_user_prompt, TranslatedText};
use crate::infra::{MalformedOutputLog, RateLimitedModel};
use crate::traits::Translator;

static IMAGE_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<img\b[^>]*>(?:\s*</img>)?").expect("image markup pattern is valid")
});

/// Remove inline `<img>` tags. Text around them is left as is.
pub fn strip_image_markup(text: &str) -> String {
    IMAGE_MARKUP.replace_all(text, "").into_owned()
}

/// Bounded retry with clamped exponential waits between attempts.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRetry {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl TranslationRetry {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_backoff: Duration::from_secs(config.min_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }

    /// Wait after the given failed attempt (1-based): 2^attempt seconds,
    /// clamped to `[min_backoff, max_backoff]`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let raw = Duration::from_secs(1u64 << attempt.min(16));
        raw.clamp(self.min_backoff, self.max_backoff.max(self.min_backoff))
    }
}

/// Translation service that asks the shared language model.
pub struct LlmTranslator {
    model: RateLimitedModel,
    retry: TranslationRetry,
    malformed: Arc<MalformedOutputLog>,
    system_prompt: String,
}

impl LlmTranslator {
    pub fn new(model: RateLimitedModel, retry: TranslationRetry, malformed: Arc<MalformedOutputLog>) -> Self {
        Self {
            model,
            retry,
            malformed,
            system_prompt: translation_system_prompt(),
        }
    }

    async fn attempt(&self, text: &str, target: Language) -> Result<String> {
        let user = translation_user_prompt(text, target);
        let raw = self.model.complete_json(&self.system_prompt, &user).await?;

        let parsed = parse_model_output::<TranslatedText>(&raw);
        match parsed {
            ParsedOutput::Parsed(t) if !t.translated_text.trim().is_empty() => Ok(t.translated_text),
            ParsedOutput::Parsed(_) => {
                Err(PressroomError::Translation(format!("empty translation to {target}")).into())
            }
            ParsedOutput::Unparseable { reason } => {
                self.malformed.record("translation", &reason, &raw).await;
                Err(PressroomError::MalformedOutput(format!("translation: {reason}")).into())
            }
        }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.attempt(text, target).await {
                Ok(translated) => return Ok(translated),
                Err(e) if attempt < self.retry.max_attempts => {
                    let wait = self.retry.backoff_after(attempt);
                    warn!(
                        language = target.code(),
                        attempt,
                        wait_secs = wait.as_secs(),
                        error = %e,
                        "Translation attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(PressroomError::Translation(format!(
                        "to {target} failed after {attempt} attempts: {e}"
                    ))
                    .into())
                }
            }
        }
    }
}
