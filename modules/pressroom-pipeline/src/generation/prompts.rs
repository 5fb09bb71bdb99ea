use schemars::JsonSchema;
use serde::Deserialize;

use pressroom_common::{Language, VariantKind};

// =============================================================================
// Response shapes
// =============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SimplifiedResponse {
    pub summary_points: Vec<SummaryPoint>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummaryPoint {
    pub title: String,
    /// Paragraphs using only <p>, <b>, <i> and <u>.
    pub description_html: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OversimplifiedResponse {
    pub story_points: Vec<StoryPoint>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StoryPoint {
    pub title: String,
    pub story_html: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummaryResponse {
    pub eye_catching_summary_sentence: String,
    pub headline: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KeyPointsResponse {
    pub key_summary_points: Vec<KeyPoint>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KeyPoint {
    pub point: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TranslatedText {
    pub translated_text: String,
}

// =============================================================================
// Prompts
// =============================================================================

const SIMPLIFIED_INSTRUCTIONS: &str = "\
You turn dense government press releases into clear explanations for the general public.
Split the release into its distinct announcements. For each one write a short, engaging
title and an HTML description at roughly an 8th-grade reading level. Use <p> for paragraphs,
<b> for key facts and figures, <i> for terms the first time they appear, and explain every
technical term in parentheses right after it. Stay neutral and add nothing that is not in
the release.";

const OVERSIMPLIFIED_INSTRUCTIONS: &str = "\
You retell government press releases as short stories a 6-8 year old can follow.
Split the release into its main ideas. For each one write a playful but accurate title and a
story in HTML using everyday comparisons. Use <p> for paragraphs and <b> for the one thing to
remember. Keep every fact true to the release.";

const SUMMARY_INSTRUCTIONS: &str = "\
You write news copy for government press releases. Produce one eye-catching sentence that
captures the whole release, and a headline of at most twelve words. Plain text only.";

const KEYPOINTS_INSTRUCTIONS: &str = "\
You extract the key facts from government press releases. List each decision, figure, date
and beneficiary as a separate, self-contained plain-text point. Do not repeat points.";

const TRANSLATE_INSTRUCTIONS: &str = "\
You are a professional translator for Indian government communications. Translate the text
you are given into the requested language. Keep names, numbers and dates accurate. Keep any
HTML tags exactly as they are and translate only the text between them.";

fn with_schema<T: JsonSchema>(instructions: &str) -> String {
    let schema = schemars::schema_for!(T);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!("{instructions}\n\nRespond with a single JSON object matching this schema:\n{schema}")
}

/// System prompt for one generated variant kind.
pub fn system_prompt(kind: VariantKind) -> Option<String> {
    let prompt = match kind {
        VariantKind::Original => return None,
        VariantKind::Summary => with_schema::<SummaryResponse>(SUMMARY_INSTRUCTIONS),
        VariantKind::Simplified => with_schema::<SimplifiedResponse>(SIMPLIFIED_INSTRUCTIONS),
        VariantKind::Oversimplified => {
            with_schema::<OversimplifiedResponse>(OVERSIMPLIFIED_INSTRUCTIONS)
        }
        VariantKind::KeyPoints => with_schema::<KeyPointsResponse>(KEYPOINTS_INSTRUCTIONS),
    };
    Some(prompt)
}

pub fn translation_system_prompt() -> String {
    with_schema::<TranslatedText>(TRANSLATE_INSTRUCTIONS)
}

pub fn translation_user_prompt(text: &str, target: Language) -> String {
    format!("Translate the following text to {}: {text}", target.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_generated_kind_has_a_prompt_naming_its_fields() {
        assert!(system_prompt(VariantKind::Summary).unwrap().contains("eye_catching_summary_sentence"));
        assert!(system_prompt(VariantKind::Simplified).unwrap().contains("description_html"));
        assert!(system_prompt(VariantKind::Oversimplified).unwrap().contains("story_html"));
        assert!(system_prompt(VariantKind::KeyPoints).unwrap().contains("key_summary_points"));
        assert!(system_prompt(VariantKind::Original).is_none());
    }

    #[test]
    fn translation_prompt_names_the_language() {
        let prompt = translation_user_prompt("Budget increases", Language::Ta);
        assert_eq!(prompt, "Translate the following text to Tamil: Budget increases");
        assert!(translation_system_prompt().contains("translated_text"));
    }
}
