use std::sync::Arc;
use std::time::Duration;

use ai_client::{Claude, Gemini, LanguageModel, OpenAi};
use anyhow::Result;
use tracing::{info, warn};

use pressroom_common::{Config, PressroomError};

use super::rate_limiter::RateLimiter;

/// Apply the optional endpoint and timeout overrides to a provider client.
macro_rules! tune {
    ($client:expr, $config:expr) => {{
        let mut client = $client;
        if let Some(url) = &$config.llm_base_url {
            client = client.with_base_url(url.clone());
        }
        if let Some(timeout) = $config.llm_timeout {
            client = client.with_timeout(timeout);
        }
        client
    }};
}

/// Pick the generation backend from whichever credential is configured.
/// Resolved once at startup; call sites only ever see `dyn LanguageModel`.
pub fn select_language_model(config: &Config) -> Result<Arc<dyn LanguageModel>, PressroomError> {
    let model: Arc<dyn LanguageModel> = if let Some(key) = &config.gemini_api_key {
        Arc::new(tune!(Gemini::new(key.clone(), config.gemini_model.clone()), config))
    } else if let Some(key) = &config.anthropic_api_key {
        Arc::new(tune!(Claude::new(key.clone(), config.anthropic_model.clone()), config))
    } else if let Some(key) = &config.openai_api_key {
        Arc::new(tune!(OpenAi::new(key.clone(), config.openai_model.clone()), config))
    } else {
        return Err(PressroomError::Config(
            "no language model configured: set GEMINI_API_KEY, ANTHROPIC_API_KEY or OPENAI_API_KEY"
                .into(),
        ));
    };

    info!(
        provider = model.provider(),
        model = model.model(),
        base_url = config.llm_base_url.as_deref().unwrap_or("[default]"),
        "Selected language model"
    );
    Ok(model)
}

/// A language model behind the shared rate limiter.
///
/// Provider throttling is waited out indefinitely; every other error is
/// returned to the caller as a generation failure.
#[derive(Clone)]
pub struct RateLimitedModel {
    model: Arc<dyn LanguageModel>,
    limiter: Arc<RateLimiter>,
    rate_limited_backoff: Duration,
}

impl RateLimitedModel {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        limiter: Arc<RateLimiter>,
        rate_limited_backoff: Duration,
    ) -> Self {
        Self {
            model,
            limiter,
            rate_limited_backoff,
        }
    }

    pub async fn complete_json(&self, system: &str, user: &str) -> Result<String, PressroomError> {
        let mut throttled = 0u32;
        loop {
            self.limiter.acquire().await;
            match self.model.complete_json(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_rate_limited() => {
                    throttled += 1;
                    warn!(
                        provider = self.model.provider(),
                        throttled,
                        wait_secs = self.rate_limited_backoff.as_secs(),
                        error = %e,
                        "Provider rate limited, waiting before retry"
                    );
                    tokio::time::sleep(self.rate_limited_backoff).await;
                }
                Err(e) => {
                    return Err(PressroomError::Generation(format!(
                        "{} call failed: {e}",
                        self.model.provider()
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            gemini_model: "g".into(),
            anthropic_model: "c".into(),
            openai_model: "o".into(),
            ..Config::default()
        }
    }

    #[test]
    fn gemini_wins_when_every_key_is_set() {
        let config = Config {
            gemini_api_key: Some("g-key".into()),
            anthropic_api_key: Some("a-key".into()),
            openai_api_key: Some("o-key".into()),
            ..config()
        };
        assert_eq!(select_language_model(&config).unwrap().provider(), "gemini");
    }

    #[test]
    fn falls_back_to_claude_then_openai() {
        let claude = Config {
            anthropic_api_key: Some("a-key".into()),
            openai_api_key: Some("o-key".into()),
            ..config()
        };
        assert_eq!(select_language_model(&claude).unwrap().provider(), "claude");

        let openai = Config {
            openai_api_key: Some("o-key".into()),
            ..config()
        };
        let model = select_language_model(&openai).unwrap();
        assert_eq!(model.provider(), "openai");
        assert_eq!(model.model(), "o");
    }

    #[test]
    fn overrides_keep_provider_selection() {
        let config = Config {
            openai_api_key: Some("o-key".into()),
            llm_base_url: Some("http://localhost:8080/v1".into()),
            llm_timeout: Some(Duration::from_secs(5)),
            ..config()
        };
        let model = select_language_model(&config).unwrap();
        assert_eq!(model.provider(), "openai");
        assert_eq!(model.model(), "o");
    }

    #[test]
    fn no_key_is_a_config_error() {
        let err = select_language_model(&config()).err().unwrap();
        assert!(matches!(err, PressroomError::Config(_)));
    }
}
