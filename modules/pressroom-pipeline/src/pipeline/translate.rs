use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pressroom_common::{Language, NewVariant, VariantItem, VariantKind};

use crate::translation::strip_image_markup;

use super::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateOutcome {
    Saved,
    /// The unit already had a record; nothing was written.
    AlreadyPresent,
    /// Translation gave up; nothing was written.
    TranslationFailed,
    DocumentMissing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub saved: usize,
    pub failed: usize,
    pub skipped: bool,
}

impl Pipeline {
    /// Translate one text (and its title) and save it as a single item.
    /// Translation failures are logged and absorbed.
    pub async fn translate_and_save(
        &self,
        document_id: Uuid,
        language: Language,
        kind: VariantKind,
        text: &str,
        title: Option<&str>,
    ) -> Result<TranslateOutcome> {
        let registry = &self.deps.registry;
        if registry.get_document(document_id).await?.is_none() {
            error!(%document_id, language = language.code(), kind = kind.as_str(), "Document not found for translation");
            return Ok(TranslateOutcome::DocumentMissing);
        }
        if registry.variant_exists(document_id, kind, language).await? {
            debug!(%document_id, language = language.code(), kind = kind.as_str(), "Already translated");
            return Ok(TranslateOutcome::AlreadyPresent);
        }

        let item = VariantItem::new(text, title.map(str::to_string));
        let Some(translated) = self.translate_item(&item, language, kind).await else {
            return Ok(TranslateOutcome::TranslationFailed);
        };

        registry
            .save_variant(NewVariant::new(document_id, language, kind, translated))
            .await?;
        info!(%document_id, language = language.code(), kind = kind.as_str(), "Translation saved");
        Ok(TranslateOutcome::Saved)
    }

    /// Save a list of items for one (document, language, kind), translating
    /// each independently when `translate` is set. One item failing never
    /// blocks its siblings. The whole unit is skipped if any item exists.
    pub async fn translate_batch_and_save(
        &self,
        document_id: Uuid,
        language: Language,
        kind: VariantKind,
        items: &[VariantItem],
        translate: bool,
    ) -> Result<BatchOutcome> {
        let registry = &self.deps.registry;
        if registry.get_document(document_id).await?.is_none() {
            error!(%document_id, language = language.code(), kind = kind.as_str(), "Document not found for batch");
            return Ok(BatchOutcome::default());
        }
        if registry.variant_exists(document_id, kind, language).await? {
            debug!(%document_id, language = language.code(), kind = kind.as_str(), "Batch already present");
            return Ok(BatchOutcome {
                skipped: true,
                ..BatchOutcome::default()
            });
        }

        let prepared: Vec<Option<VariantItem>> = if translate {
            join_all(items.iter().map(|item| self.translate_item(item, language, kind))).await
        } else {
            items.iter().cloned().map(Some).collect()
        };

        let mut outcome = BatchOutcome::default();
        for item in prepared {
            match item {
                Some(item) => {
                    registry
                        .save_variant(NewVariant::new(document_id, language, kind, item))
                        .await?;
                    outcome.saved += 1;
                }
                None => outcome.failed += 1,
            }
        }

        info!(
            %document_id,
            language = language.code(),
            kind = kind.as_str(),
            saved = outcome.saved,
            failed = outcome.failed,
            "Batch saved"
        );
        Ok(outcome)
    }

    /// `None` when the body could not be translated. A failed title is
    /// dropped and the body kept.
    async fn translate_item(&self, item: &VariantItem, language: Language, kind: VariantKind) -> Option<VariantItem> {
        let translator = &self.deps.translator;

        let body = match translator.translate(&strip_image_markup(&item.body), language).await {
            Ok(body) => body,
            Err(e) => {
                warn!(language = language.code(), kind = kind.as_str(), error = %e, "Translation failed");
                return None;
            }
        };

        let title = match &item.title {
            Some(title) => match translator.translate(&strip_image_markup(title), language).await {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(language = language.code(), kind = kind.as_str(), error = %e, "Title translation failed, saving without title");
                    None
                }
            },
            None => None,
        };

        Some(VariantItem { body, title })
    }
}
