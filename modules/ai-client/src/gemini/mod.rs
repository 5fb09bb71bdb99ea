mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::LanguageModel;
use crate::util::DEFAULT_REQUEST_TIMEOUT;

use client::GeminiClient;
use types::GenerateRequest;

// =============================================================================
// Gemini
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

#[async_trait]
impl LanguageModel for Gemini {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AiError> {
        let request = GenerateRequest::json(system, user);
        let response = self.client().generate(&self.model, &request).await?;
        response.text().ok_or(AiError::EmptyResponse("gemini"))
    }
}
