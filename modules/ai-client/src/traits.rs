use async_trait::async_trait;

use crate::error::AiError;

// =============================================================================
// LanguageModel Trait
// =============================================================================

/// A single-shot completion endpoint that is asked to answer in JSON.
///
/// Implemented by every provider so the caller can pick one at startup and
/// hold it as `Arc<dyn LanguageModel>`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short provider name for logs ("gemini", "claude", "openai").
    fn provider(&self) -> &'static str;

    fn model(&self) -> &str;

    /// Send a system + user prompt and return the raw text of the reply.
    /// The reply is expected, but not guaranteed, to be a JSON document.
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AiError>;
}
