use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pressroom_common::{
    Classification, ContentVariant, Document, Language, Ministry, NewDocument, NewVariant,
    PressroomError, VariantKind,
};

use crate::traits::{DocumentRegistry, JobLedger, JobProgress};

#[derive(Default)]
struct MemoryState {
    ministries: Vec<Ministry>,
    documents: Vec<Document>,
    variants: Vec<ContentVariant>,
    jobs: HashMap<Uuid, JobProgress>,
}

/// Registry and job ledger held in process memory.
///
/// Same semantics as the Postgres implementation: one lock guards every
/// check-then-insert, so create-if-absent and counter increments are atomic.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of documents stored under a source URL.
    pub fn count_documents(&self, source_url: &str) -> usize {
        self.state()
            .documents
            .iter()
            .filter(|d| d.source_url == source_url)
            .count()
    }

    pub fn count_variants(&self, document_id: Uuid, kind: VariantKind, language: Language) -> usize {
        self.state()
            .variants
            .iter()
            .filter(|v| v.document_id == document_id && v.kind == kind && v.language == language)
            .count()
    }

    pub fn total_variants(&self) -> usize {
        self.state().variants.len()
    }
}

#[async_trait]
impl DocumentRegistry for MemoryRegistry {
    async fn document_exists(&self, source_url: &str) -> Result<bool> {
        Ok(self.state().documents.iter().any(|d| d.source_url == source_url))
    }

    async fn find_document(&self, source_url: &str) -> Result<Option<Document>> {
        Ok(self
            .state()
            .documents
            .iter()
            .find(|d| d.source_url == source_url)
            .cloned())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.state().documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.state().documents.clone())
    }

    async fn ready_documents(&self) -> Result<Vec<Document>> {
        Ok(self
            .state()
            .documents
            .iter()
            .filter(|d| d.is_ready)
            .cloned()
            .collect())
    }

    async fn unready_documents(&self, created_before: DateTime<Utc>) -> Result<Vec<Document>> {
        let mut stalled: Vec<Document> = self
            .state()
            .documents
            .iter()
            .filter(|d| !d.is_ready && d.created_at < created_before)
            .cloned()
            .collect();
        stalled.sort_by_key(|d| d.created_at);
        Ok(stalled)
    }

    async fn get_or_create_ministry(&self, name: &str) -> Result<Ministry> {
        let name = name.trim();
        let mut state = self.state();
        if let Some(existing) = state.ministries.iter().find(|m| m.name == name) {
            return Ok(existing.clone());
        }
        let ministry = Ministry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.ministries.push(ministry.clone());
        Ok(ministry)
    }

    async fn get_ministry(&self, id: Uuid) -> Result<Option<Ministry>> {
        Ok(self.state().ministries.iter().find(|m| m.id == id).cloned())
    }

    async fn create_document_if_absent(&self, new: NewDocument) -> Result<(Document, bool)> {
        let mut state = self.state();
        if let Some(existing) = state.documents.iter().find(|d| d.source_url == new.source_url) {
            return Ok((existing.clone(), false));
        }
        let document = Document {
            id: Uuid::new_v4(),
            source_url: new.source_url,
            title: new.title,
            original_text: new.original_text,
            ministry_id: new.ministry_id,
            published_at: new.published_at,
            origin_office: new.origin_office,
            classification: new.classification,
            is_ready: false,
            created_at: Utc::now(),
        };
        state.documents.push(document.clone());
        Ok((document, true))
    }

    async fn set_classification(&self, id: Uuid, classification: &Classification) -> Result<()> {
        let mut state = self.state();
        let document = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(PressroomError::DocumentNotFound(id))?;
        document.classification = classification.clone();
        Ok(())
    }

    async fn mark_ready(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state();
        let document = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(PressroomError::DocumentNotFound(id))?;
        let flipped = !document.is_ready;
        document.is_ready = true;
        Ok(flipped)
    }

    async fn variant_exists(
        &self,
        document_id: Uuid,
        kind: VariantKind,
        language: Language,
    ) -> Result<bool> {
        Ok(self
            .state()
            .variants
            .iter()
            .any(|v| v.document_id == document_id && v.kind == kind && v.language == language))
    }

    async fn save_variant(&self, new: NewVariant) -> Result<ContentVariant> {
        let mut state = self.state();
        if !state.documents.iter().any(|d| d.id == new.document_id) {
            return Err(PressroomError::DocumentNotFound(new.document_id).into());
        }
        if new.kind == VariantKind::Original {
            if let Some(existing) = state
                .variants
                .iter()
                .find(|v| v.document_id == new.document_id && v.kind == VariantKind::Original)
            {
                return Ok(existing.clone());
            }
        }
        let variant = ContentVariant {
            id: Uuid::new_v4(),
            document_id: new.document_id,
            language: new.language,
            kind: new.kind,
            body: new.body,
            title: new.title,
            created_at: Utc::now(),
        };
        state.variants.push(variant.clone());
        Ok(variant)
    }

    async fn variants(
        &self,
        document_id: Uuid,
        kind: VariantKind,
        language: Language,
    ) -> Result<Vec<ContentVariant>> {
        Ok(self
            .state()
            .variants
            .iter()
            .filter(|v| v.document_id == document_id && v.kind == kind && v.language == language)
            .cloned()
            .collect())
    }

    async fn all_variants(&self, document_id: Uuid) -> Result<Vec<ContentVariant>> {
        Ok(self
            .state()
            .variants
            .iter()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn available_languages(&self, document_id: Uuid) -> Result<Vec<Language>> {
        let languages: BTreeSet<Language> = self
            .state()
            .variants
            .iter()
            .filter(|v| v.document_id == document_id)
            .map(|v| v.language)
            .collect();
        Ok(languages.into_iter().collect())
    }
}

#[async_trait]
impl JobLedger for MemoryRegistry {
    async fn open_job(&self, document_id: Uuid, fan_out: u32) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.state().jobs.insert(
            id,
            JobProgress {
                document_id,
                fan_out,
                completed: 0,
            },
        );
        Ok(id)
    }

    async fn record_leaf(&self, job_id: Uuid) -> Result<JobProgress> {
        let mut state = self.state();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| anyhow::anyhow!("unknown fan-out job {job_id}"))?;
        job.completed += 1;
        Ok(*job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_document(url: &str, ministry_id: Uuid) -> NewDocument {
        NewDocument {
            source_url: url.to_string(),
            title: "Title".into(),
            original_text: "Text".into(),
            ministry_id,
            published_at: Utc::now(),
            origin_office: None,
            classification: Classification::default(),
        }
    }

    #[tokio::test]
    async fn create_if_absent_keeps_first_document() {
        let registry = MemoryRegistry::new();
        let ministry = registry.get_or_create_ministry("Ministry of Finance").await.unwrap();

        let (first, created) = registry
            .create_document_if_absent(new_document("https://x/1", ministry.id))
            .await
            .unwrap();
        assert!(created);

        let mut second = new_document("https://x/1", ministry.id);
        second.title = "Other".into();
        let (again, created) = registry.create_document_if_absent(second).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.title, "Title");
        assert_eq!(registry.count_documents("https://x/1"), 1);
    }

    #[tokio::test]
    async fn ministries_are_created_once() {
        let registry = MemoryRegistry::new();
        let a = registry.get_or_create_ministry("Ministry of Coal").await.unwrap();
        let b = registry.get_or_create_ministry(" Ministry of Coal ").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn original_variant_is_stored_once() {
        let registry = MemoryRegistry::new();
        let ministry = registry.get_or_create_ministry("M").await.unwrap();
        let (doc, _) = registry
            .create_document_if_absent(new_document("https://x/1", ministry.id))
            .await
            .unwrap();

        for _ in 0..2 {
            registry
                .save_variant(NewVariant {
                    document_id: doc.id,
                    language: Language::En,
                    kind: VariantKind::Original,
                    body: "Text".into(),
                    title: None,
                })
                .await
                .unwrap();
        }
        assert_eq!(registry.count_variants(doc.id, VariantKind::Original, Language::En), 1);
        assert!(registry.variant_exists(doc.id, VariantKind::Original, Language::En).await.unwrap());
        assert!(!registry.variant_exists(doc.id, VariantKind::Summary, Language::En).await.unwrap());
    }

    #[tokio::test]
    async fn mark_ready_flips_once() {
        let registry = MemoryRegistry::new();
        let ministry = registry.get_or_create_ministry("M").await.unwrap();
        let (doc, _) = registry
            .create_document_if_absent(new_document("https://x/1", ministry.id))
            .await
            .unwrap();

        assert!(registry.ready_documents().await.unwrap().is_empty());
        assert!(registry.mark_ready(doc.id).await.unwrap());
        assert!(!registry.mark_ready(doc.id).await.unwrap());
        assert_eq!(registry.ready_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unready_documents_excludes_ready_and_recent() {
        let registry = MemoryRegistry::new();
        let ministry = registry.get_or_create_ministry("M").await.unwrap();
        let (stalled, _) = registry
            .create_document_if_absent(new_document("https://x/1", ministry.id))
            .await
            .unwrap();
        let (done, _) = registry
            .create_document_if_absent(new_document("https://x/2", ministry.id))
            .await
            .unwrap();
        registry.mark_ready(done.id).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(1);
        let found = registry.unready_documents(later).await.unwrap();
        assert_eq!(found.iter().map(|d| d.id).collect::<Vec<_>>(), vec![stalled.id]);

        let earlier = stalled.created_at - chrono::Duration::seconds(1);
        assert!(registry.unready_documents(earlier).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exactly_one_leaf_completes_the_job() {
        let registry = std::sync::Arc::new(MemoryRegistry::new());
        let job = registry.open_job(Uuid::new_v4(), 30).await.unwrap();

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.record_leaf(job).await.unwrap() })
            })
            .collect();

        let mut completions = 0;
        for handle in handles {
            if handle.await.unwrap().is_complete() {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let registry = MemoryRegistry::new();
        let err = registry.mark_ready(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PressroomError>(),
            Some(PressroomError::DocumentNotFound(_))
        ));
    }
}
