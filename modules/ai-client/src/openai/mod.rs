mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::LanguageModel;
use crate::util::DEFAULT_REQUEST_TIMEOUT;

use client::OpenAiClient;

// =============================================================================
// OpenAi
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl OpenAi {
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

    pub(crate) fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    /// Chat completion, optionally constrained to a JSON object reply.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        json_mode: bool,
    ) -> Result<String, AiError> {
        let mut request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::system(system))
            .message(types::WireMessage::user(user));

        if types::uses_max_completion_tokens(&self.model) {
            request = request.max_completion_tokens(8192);
        } else {
            request = request.max_tokens(8192).temperature(0.0);
        }
        if json_mode {
            request = request.json_mode();
        }

        let response = self.client().chat(&request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse("openai"))
    }
}

#[async_trait]
impl LanguageModel for OpenAi {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AiError> {
        self.chat_completion(system, user, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gpt-4o");
        assert_eq!(ai.model, "gpt-4o");
        assert_eq!(ai.api_key, "sk-test");
    }

    #[test]
    fn test_openai_with_base_url() {
        let ai = OpenAi::new("sk-test", "gpt-4o").with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url, Some("https://custom.api.com".to_string()));
        assert_eq!(ai.provider(), "openai");
    }
}
