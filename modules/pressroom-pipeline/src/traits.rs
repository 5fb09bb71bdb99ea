// Trait seams for the pipeline's collaborators and shared state.
//
// ContentSource, ContentGenerator and Translator are the external services.
// DocumentRegistry and JobLedger are the only shared mutable state; every
// write through them is create-if-absent, append-only, or a single flag set.
// TaskQueue is how handlers dispatch follow-up work.
//
// Mocks for all of these live in `testing.rs` behind the `test-support` feature.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use pressroom_common::{
    Classification, ContentVariant, DiscoveredRelease, Document, FetchedContent, Language,
    Ministry, NewDocument, NewVariant, VariantItem, VariantKind,
};

use crate::jobs::Task;

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Releases listed for a given day. An `Err` fails the whole attempt.
    async fn discover(&self, date: NaiveDate) -> Result<Vec<DiscoveredRelease>>;

    /// Content of one release. `Ok(None)` means the page had no content.
    async fn fetch(&self, url: &str) -> Result<Option<FetchedContent>>;
}

// ---------------------------------------------------------------------------
// ContentGenerator
// ---------------------------------------------------------------------------

/// Structured result of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Summary { sentence: String, headline: String },
    Items(Vec<VariantItem>),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce one variant set from the source text. Only generated kinds
    /// are valid; `VariantKind::Original` is an error.
    async fn generate(&self, kind: VariantKind, text: &str) -> Result<Generated>;
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate a fragment. `Err` means every internal retry was spent.
    async fn translate(&self, text: &str, target: Language) -> Result<String>;
}

// ---------------------------------------------------------------------------
// DocumentRegistry
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    async fn document_exists(&self, source_url: &str) -> Result<bool>;

    async fn find_document(&self, source_url: &str) -> Result<Option<Document>>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Documents downstream readers may show.
    async fn ready_documents(&self) -> Result<Vec<Document>>;

    /// Documents still not ready that were created before `created_before`,
    /// oldest first.
    async fn unready_documents(&self, created_before: DateTime<Utc>) -> Result<Vec<Document>>;

    async fn get_or_create_ministry(&self, name: &str) -> Result<Ministry>;

    async fn get_ministry(&self, id: Uuid) -> Result<Option<Ministry>>;

    /// Insert keyed on `source_url`. Returns the stored row and whether this
    /// call created it. An existing row is returned untouched.
    async fn create_document_if_absent(&self, document: NewDocument) -> Result<(Document, bool)>;

    async fn set_classification(&self, id: Uuid, classification: &Classification) -> Result<()>;

    /// Flip readiness on. Returns `true` only for the call that flipped it.
    async fn mark_ready(&self, id: Uuid) -> Result<bool>;

    /// Presence of any item for (document, kind, language).
    async fn variant_exists(
        &self,
        document_id: Uuid,
        kind: VariantKind,
        language: Language,
    ) -> Result<bool>;

    /// Append one item. An `Original` for a document that already has one
    /// returns the existing record.
    async fn save_variant(&self, variant: NewVariant) -> Result<ContentVariant>;

    async fn variants(
        &self,
        document_id: Uuid,
        kind: VariantKind,
        language: Language,
    ) -> Result<Vec<ContentVariant>>;

    async fn all_variants(&self, document_id: Uuid) -> Result<Vec<ContentVariant>>;

    /// Distinct languages among a document's variants.
    async fn available_languages(&self, document_id: Uuid) -> Result<Vec<Language>>;
}

// ---------------------------------------------------------------------------
// JobLedger
// ---------------------------------------------------------------------------

/// Counter state of one fan-out group after a leaf was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    pub document_id: Uuid,
    pub fan_out: u32,
    pub completed: u32,
}

impl JobProgress {
    pub fn is_complete(&self) -> bool {
        self.completed == self.fan_out
    }
}

#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Register a fan-out group of `fan_out` leaves for a document.
    async fn open_job(&self, document_id: Uuid, fan_out: u32) -> Result<Uuid>;

    /// Count one leaf as terminal. The increment is atomic, so exactly one
    /// caller observes `completed == fan_out`.
    async fn record_leaf(&self, job_id: Uuid) -> Result<JobProgress>;
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task) -> Result<()>;
}
