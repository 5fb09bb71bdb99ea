pub mod parse;
pub mod prompts;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use pressroom_common::{PressroomError, VariantItem, VariantKind};

use crate::infra::{MalformedOutputLog, RateLimitedModel};
use crate::traits::{ContentGenerator, Generated};
use parse::{parse_model_output, ParsedOutput};
use prompts::*;

/// Width used when rendering release HTML to text for the model.
const PROMPT_TEXT_WIDTH: usize = 200;

/// Generation service backed by a language model.
pub struct LlmGenerator {
    model: RateLimitedModel,
    malformed: Arc<MalformedOutputLog>,
}

impl LlmGenerator {
    pub fn new(model: RateLimitedModel, malformed: Arc<MalformedOutputLog>) -> Self {
        Self { model, malformed }
    }

    async fn call<T: DeserializeOwned>(&self, kind: VariantKind, system: &str, text: &str) -> Result<T> {
        let user = html2text::from_read(text.as_bytes(), PROMPT_TEXT_WIDTH).unwrap_or_else(|_| text.to_string());
        let raw = self.model.complete_json(system, &user).await?;

        match parse_model_output::<T>(&raw) {
            ParsedOutput::Parsed(value) => Ok(value),
            ParsedOutput::Unparseable { reason } => {
                self.malformed.record(kind.as_str(), &reason, &raw).await;
                Err(PressroomError::MalformedOutput(format!("{kind}: {reason}")).into())
            }
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate(&self, kind: VariantKind, text: &str) -> Result<Generated> {
        let Some(system) = system_prompt(kind) else {
            return Err(PressroomError::Generation(format!("{kind} is not a generated variant")).into());
        };
        debug!(kind = kind.as_str(), chars = text.len(), "Generating variant");

        let generated = match kind {
            VariantKind::Summary => {
                let r: SummaryResponse = self.call(kind, &system, text).await?;
                Generated::Summary {
                    sentence: r.eye_catching_summary_sentence,
                    headline: r.headline,
                }
            }
            VariantKind::Simplified => {
                let r: SimplifiedResponse = self.call(kind, &system, text).await?;
                Generated::Items(
                    r.summary_points
                        .into_iter()
                        .map(|p| VariantItem::new(p.description_html, Some(p.title)))
                        .collect(),
                )
            }
            VariantKind::Oversimplified => {
                let r: OversimplifiedResponse = self.call(kind, &system, text).await?;
                Generated::Items(
                    r.story_points
                        .into_iter()
                        .map(|p| VariantItem::new(p.story_html, Some(p.title)))
                        .collect(),
                )
            }
            VariantKind::KeyPoints => {
                let r: KeyPointsResponse = self.call(kind, &system, text).await?;
                Generated::Items(
                    r.key_summary_points
                        .into_iter()
                        .map(|p| VariantItem::new(p.point, None))
                        .collect(),
                )
            }
            VariantKind::Original => {
                return Err(PressroomError::Generation("original is not generated".into()).into())
            }
        };
        Ok(generated)
    }
}
