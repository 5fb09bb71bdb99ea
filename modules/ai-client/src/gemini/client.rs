use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use super::types::*;
use crate::error::AiError;
use crate::util::http_client;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) struct GeminiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: http_client(timeout),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, AiError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, AiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        debug!(model, "Gemini generate request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::from_status(status, error_text));
        }

        Ok(response.json().await?)
    }
}
