use std::sync::Arc;

use typed_builder::TypedBuilder;

use pressroom_common::{Language, Taxonomy};

use crate::traits::{ContentGenerator, ContentSource, DocumentRegistry, JobLedger, Translator};

/// Long-lived collaborators shared by every task the pipeline runs.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub source: Arc<dyn ContentSource>,
    pub generator: Arc<dyn ContentGenerator>,
    pub translator: Arc<dyn Translator>,
    pub registry: Arc<dyn DocumentRegistry>,
    pub ledger: Arc<dyn JobLedger>,
    pub taxonomy: Arc<Taxonomy>,
    #[builder(default = Language::En)]
    pub source_language: Language,
    /// Translation targets. The source language and repeats are ignored.
    #[builder(default = default_targets())]
    pub target_languages: Vec<Language>,
}

fn default_targets() -> Vec<Language> {
    Language::ALL
        .into_iter()
        .filter(|l| *l != Language::En)
        .collect()
}

impl PipelineDeps {
    /// Distinct translation targets in configured order.
    pub fn targets(&self) -> Vec<Language> {
        let mut targets = Vec::with_capacity(self.target_languages.len());
        for language in &self.target_languages {
            if *language != self.source_language && !targets.contains(language) {
                targets.push(*language);
            }
        }
        targets
    }
}
