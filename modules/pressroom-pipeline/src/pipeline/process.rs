use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pressroom_common::{
    Document, Language, NewDocument, NewVariant, PressroomError, VariantItem, VariantKind,
};

use crate::jobs::Task;
use crate::traits::{Generated, TaskQueue};

use super::Pipeline;

/// Metadata to use when the fetched page does not carry its own.
#[derive(Debug, Clone, Default)]
pub struct SourceDefaults {
    pub published_at: Option<DateTime<Utc>>,
    pub origin_office: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The source returned nothing for this URL. No record was created.
    NoContent,
    /// Translation leaves were dispatched under one fan-out job.
    Dispatched { document_id: Uuid, subtasks: usize },
    /// Every unit was already present; the document was finalized directly.
    Finalized { document_id: Uuid },
}

struct Headline {
    sentence: String,
    headline: String,
}

/// Source-language variant sets, in the order they fan out.
struct SourceVariants {
    summary: Headline,
    item_sets: Vec<(VariantKind, Vec<VariantItem>)>,
}

const ITEM_KINDS: [VariantKind; 3] = [
    VariantKind::Simplified,
    VariantKind::Oversimplified,
    VariantKind::KeyPoints,
];

impl Pipeline {
    /// Fetch one release, write its source-language variants, and dispatch
    /// the translation fan-out. Safe to run any number of times per URL.
    pub async fn process_document(
        &self,
        url: &str,
        ministry_name: &str,
        defaults: SourceDefaults,
        queue: &dyn TaskQueue,
    ) -> Result<ProcessOutcome> {
        let result = self.process_inner(url, ministry_name, defaults, queue).await;
        if let Err(e) = &result {
            error!(url, ministry = ministry_name, error = format!("{e:#}"), "Processing failed, document left unfinished");
        }
        result
    }

    async fn process_inner(
        &self,
        url: &str,
        ministry_name: &str,
        defaults: SourceDefaults,
        queue: &dyn TaskQueue,
    ) -> Result<ProcessOutcome> {
        let deps = &self.deps;
        let src = deps.source_language;
        info!(url, ministry = ministry_name, "Processing document");

        // 1. Fetch
        let Some(content) = deps
            .source
            .fetch(url)
            .await?
            .filter(|c| !c.text.trim().is_empty())
        else {
            warn!(url, "No content returned, skipping");
            return Ok(ProcessOutcome::NoContent);
        };

        // 2. Ministry
        let ministry = deps.registry.get_or_create_ministry(ministry_name).await?;

        // 3. Headline first: without it there is no record to create.
        let existing = deps.registry.find_document(url).await?;
        let summary = match &existing {
            Some(doc) => match self.stored_summary(doc.id, src).await? {
                Some(stored) => stored,
                None => self.generate_headline(url, &doc.original_text).await?,
            },
            None => self.generate_headline(url, &content.text).await?,
        };

        // 4. Create-if-absent on the source URL
        let (document, created) = deps
            .registry
            .create_document_if_absent(NewDocument {
                source_url: url.to_string(),
                title: summary.headline.clone(),
                original_text: content.text.clone(),
                ministry_id: ministry.id,
                published_at: content
                    .published_at
                    .or(defaults.published_at)
                    .unwrap_or_else(Utc::now),
                origin_office: content.origin_office.clone().or(defaults.origin_office),
                classification: deps.taxonomy.classify(&ministry.name),
            })
            .await?;
        if created {
            info!(url, document_id = %document.id, title = document.title.as_str(), "Document created");
        } else {
            info!(url, document_id = %document.id, "Document already existed, resuming");
        }

        // 5. Original and summary in the source language
        if !deps.registry.variant_exists(document.id, VariantKind::Original, src).await? {
            deps.registry
                .save_variant(NewVariant {
                    document_id: document.id,
                    language: src,
                    kind: VariantKind::Original,
                    body: document.original_text.clone(),
                    title: None,
                })
                .await?;
        }
        if !deps.registry.variant_exists(document.id, VariantKind::Summary, src).await? {
            deps.registry
                .save_variant(NewVariant {
                    document_id: document.id,
                    language: src,
                    kind: VariantKind::Summary,
                    body: summary.sentence.clone(),
                    title: Some(summary.headline.clone()),
                })
                .await?;
        }

        // 6. Remaining source-language sets: reuse what is stored, generate the rest.
        let mut item_sets = Vec::with_capacity(ITEM_KINDS.len());
        for kind in ITEM_KINDS {
            let items = self.source_items(&document, kind).await?;
            item_sets.push((kind, items));
        }
        let variants = SourceVariants { summary, item_sets };

        // 7. One leaf per missing (language, kind)
        let subtasks = self.missing_translations(&document, &variants).await?;

        // 8. Fan out under one barrier, or finalize straight away.
        if subtasks.is_empty() {
            debug!(document_id = %document.id, "Nothing to translate");
            self.finalize(document.id).await?;
            return Ok(ProcessOutcome::Finalized {
                document_id: document.id,
            });
        }

        let count = subtasks.len();
        self.dispatch_fan_out(document.id, subtasks, queue).await?;
        info!(document_id = %document.id, subtasks = count, "Translations dispatched");
        Ok(ProcessOutcome::Dispatched {
            document_id: document.id,
            subtasks: count,
        })
    }

    async fn generate_headline(&self, url: &str, text: &str) -> Result<Headline> {
        match self.deps.generator.generate(VariantKind::Summary, text).await? {
            Generated::Summary { sentence, headline } if !headline.trim().is_empty() => Ok(Headline {
                sentence,
                headline: headline.trim().to_string(),
            }),
            _ => Err(PressroomError::MissingHeadline {
                url: url.to_string(),
            }
            .into()),
        }
    }

    async fn stored_summary(&self, document_id: Uuid, src: Language) -> Result<Option<Headline>> {
        let stored = self
            .deps
            .registry
            .variants(document_id, VariantKind::Summary, src)
            .await?;
        Ok(stored.into_iter().find_map(|v| {
            let headline = v.title.filter(|t| !t.trim().is_empty())?;
            Some(Headline {
                sentence: v.body,
                headline,
            })
        }))
    }

    async fn source_items(&self, document: &Document, kind: VariantKind) -> Result<Vec<VariantItem>> {
        let deps = &self.deps;
        let src = deps.source_language;

        if deps.registry.variant_exists(document.id, kind, src).await? {
            let stored = deps.registry.variants(document.id, kind, src).await?;
            return Ok(stored.iter().map(VariantItem::from).collect());
        }

        let items = match deps.generator.generate(kind, &document.original_text).await? {
            Generated::Items(items) => items,
            Generated::Summary { .. } => {
                return Err(PressroomError::Generation(format!("{kind} returned a summary shape")).into())
            }
        };
        self.translate_batch_and_save(document.id, src, kind, &items, false)
            .await?;
        Ok(items)
    }

    async fn missing_translations(&self, document: &Document, variants: &SourceVariants) -> Result<Vec<Task>> {
        let registry = &self.deps.registry;
        let mut tasks = Vec::new();

        for language in self.deps.targets() {
            if !registry.variant_exists(document.id, VariantKind::Summary, language).await? {
                tasks.push(Task::TranslateText {
                    job_id: None,
                    document_id: document.id,
                    language,
                    kind: VariantKind::Summary,
                    text: variants.summary.sentence.clone(),
                    title: Some(variants.summary.headline.clone()),
                });
            }

            for (kind, items) in &variants.item_sets {
                if items.is_empty() || registry.variant_exists(document.id, *kind, language).await? {
                    continue;
                }
                tasks.push(Task::TranslateBatch {
                    job_id: None,
                    document_id: document.id,
                    language,
                    kind: *kind,
                    items: items.clone(),
                    translate: true,
                });
            }
        }

        Ok(tasks)
    }
}
