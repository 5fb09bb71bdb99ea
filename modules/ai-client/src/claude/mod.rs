mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::LanguageModel;
use crate::util::DEFAULT_REQUEST_TIMEOUT;

use client::ClaudeClient;
use types::*;

// =============================================================================
// Claude
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl Claude {
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

    pub(crate) fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String, AiError> {
        let request = ChatRequest::new(&self.model)
            .system(system)
            .message(WireMessage::user(user))
            .temperature(0.0);

        let response = self.client().chat(&request).await?;

        response.text().ok_or(AiError::EmptyResponse("claude"))
    }
}

#[async_trait]
impl LanguageModel for Claude {
    fn provider(&self) -> &'static str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AiError> {
        // Claude has no JSON mode; the system prompt carries the format contract.
        self.chat_completion(
            format!("{system}\n\nRespond with a single JSON document and nothing else."),
            user,
        )
        .await
    }
}
