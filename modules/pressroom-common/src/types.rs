use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Enums ---

/// Languages a release is published in. English is the source language;
/// every other entry is a translation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    Ta,
    Mr,
    Gu,
    Bn,
    Or,
    Ml,
    Kn,
    Pa,
    Te,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::En,
        Language::Hi,
        Language::Ta,
        Language::Mr,
        Language::Gu,
        Language::Bn,
        Language::Or,
        Language::Ml,
        Language::Kn,
        Language::Pa,
        Language::Te,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ta => "ta",
            Language::Mr => "mr",
            Language::Gu => "gu",
            Language::Bn => "bn",
            Language::Or => "or",
            Language::Ml => "ml",
            Language::Kn => "kn",
            Language::Pa => "pa",
            Language::Te => "te",
        }
    }

    /// English display name, used in translation prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hi => "Hindi",
            Language::Ta => "Tamil",
            Language::Mr => "Marathi",
            Language::Gu => "Gujarati",
            Language::Bn => "Bengali",
            Language::Or => "Odia",
            Language::Ml => "Malayalam",
            Language::Kn => "Kannada",
            Language::Pa => "Punjabi",
            Language::Te => "Telugu",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|l| l.code() == code)
            .ok_or_else(|| format!("unknown language code: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    /// Untranslated source text. Never generated, exactly one per document.
    Original,
    Summary,
    Simplified,
    Oversimplified,
    #[serde(rename = "keypoints")]
    KeyPoints,
}

impl VariantKind {
    pub const ALL: [VariantKind; 5] = [
        VariantKind::Original,
        VariantKind::Summary,
        VariantKind::Simplified,
        VariantKind::Oversimplified,
        VariantKind::KeyPoints,
    ];

    /// Kinds produced by the generation service and fanned out to translation.
    pub const GENERATED: [VariantKind; 4] = [
        VariantKind::Summary,
        VariantKind::Simplified,
        VariantKind::Oversimplified,
        VariantKind::KeyPoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Original => "original",
            VariantKind::Summary => "summary",
            VariantKind::Simplified => "simplified",
            VariantKind::Oversimplified => "oversimplified",
            VariantKind::KeyPoints => "keypoints",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown variant kind: {s}"))
    }
}

// --- Registry records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ministry {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Audience and category tags derived from the issuing ministry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub audiences: Vec<String>,
    pub categories: Vec<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.audiences.is_empty() && self.categories.is_empty()
    }
}

/// One ingested press release. Identity is `source_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_url: String,
    pub title: String,
    pub original_text: String,
    pub ministry_id: Uuid,
    pub published_at: DateTime<Utc>,
    pub origin_office: Option<String>,
    pub classification: Classification,
    pub is_ready: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub source_url: String,
    pub title: String,
    pub original_text: String,
    pub ministry_id: Uuid,
    pub published_at: DateTime<Utc>,
    pub origin_office: Option<String>,
    pub classification: Classification,
}

/// One generated or translated artifact. Several items of the same
/// (document, language, kind) may exist, each its own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentVariant {
    pub id: Uuid,
    pub document_id: Uuid,
    pub language: Language,
    pub kind: VariantKind,
    pub body: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub document_id: Uuid,
    pub language: Language,
    pub kind: VariantKind,
    pub body: String,
    pub title: Option<String>,
}

impl NewVariant {
    pub fn new(document_id: Uuid, language: Language, kind: VariantKind, item: VariantItem) -> Self {
        Self {
            document_id,
            language,
            kind,
            body: item.body,
            title: item.title,
        }
    }
}

// --- Pipeline payloads ---

/// A body with an optional sub-title, the unit carried through translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantItem {
    pub body: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl VariantItem {
    pub fn new(body: impl Into<String>, title: Option<String>) -> Self {
        Self {
            body: body.into(),
            title,
        }
    }
}

impl From<&ContentVariant> for VariantItem {
    fn from(v: &ContentVariant) -> Self {
        Self {
            body: v.body.clone(),
            title: v.title.clone(),
        }
    }
}

/// A listing entry returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRelease {
    pub ministry: String,
    pub title: String,
    pub url: String,
}

/// Raw content of a single release page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedContent {
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    pub origin_office: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_round_trip_through_from_str() {
        for lang in Language::ALL {
            assert_eq!(lang.code().parse::<Language>().unwrap(), lang);
        }
        assert_eq!(" HI ".parse::<Language>().unwrap(), Language::Hi);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn keypoints_serializes_as_single_word() {
        let json = serde_json::to_string(&VariantKind::KeyPoints).unwrap();
        assert_eq!(json, "\"keypoints\"");
        assert_eq!("keypoints".parse::<VariantKind>().unwrap(), VariantKind::KeyPoints);
    }

    #[test]
    fn generated_kinds_exclude_original() {
        assert!(!VariantKind::GENERATED.contains(&VariantKind::Original));
        assert_eq!(VariantKind::GENERATED.len() + 1, VariantKind::ALL.len());
    }
}
