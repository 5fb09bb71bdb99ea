use anyhow::Result;
use tracing::{info, warn};

use pressroom_common::Taxonomy;

use crate::traits::DocumentRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclassifyReport {
    pub examined: usize,
    pub changed: usize,
    /// Documents whose ministry has no taxonomy entry.
    pub unmatched: usize,
}

/// Recompute every document's audience and category tags from `taxonomy`.
/// With `dry_run` nothing is written; the report still counts what would
/// change.
pub async fn reclassify(registry: &dyn DocumentRegistry, taxonomy: &Taxonomy, dry_run: bool) -> Result<ReclassifyReport> {
    let mut report = ReclassifyReport::default();

    for document in registry.list_documents().await? {
        report.examined += 1;

        let Some(ministry) = registry.get_ministry(document.ministry_id).await? else {
            warn!(document_id = %document.id, ministry_id = %document.ministry_id, "Ministry missing, skipping");
            report.unmatched += 1;
            continue;
        };
        if !taxonomy.contains(&ministry.name) {
            report.unmatched += 1;
        }

        let classification = taxonomy.classify(&ministry.name);
        if classification == document.classification {
            continue;
        }

        report.changed += 1;
        if !dry_run {
            registry.set_classification(document.id, &classification).await?;
        }
    }

    info!(
        examined = report.examined,
        changed = report.changed,
        unmatched = report.unmatched,
        dry_run,
        "Reclassification complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pressroom_common::{Classification, NewDocument};

    use crate::store::MemoryRegistry;

    async fn seed(registry: &MemoryRegistry, url: &str, ministry: &str, classification: Classification) {
        let ministry = registry.get_or_create_ministry(ministry).await.unwrap();
        registry
            .create_document_if_absent(NewDocument {
                source_url: url.into(),
                title: "t".into(),
                original_text: "body".into(),
                ministry_id: ministry.id,
                published_at: Utc::now(),
                origin_office: None,
                classification,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fills_stale_tags_and_counts_unknown_ministries() {
        let registry = MemoryRegistry::new();
        let taxonomy = Taxonomy::builtin().unwrap();
        seed(&registry, "https://x/1", "Ministry of Finance", Classification::default()).await;
        seed(&registry, "https://x/2", "Ministry of Finance", taxonomy.classify("Ministry of Finance")).await;
        seed(&registry, "https://x/3", "Ministry of Silly Walks", Classification::default()).await;

        let report = reclassify(&registry, &taxonomy, false).await.unwrap();
        assert_eq!(
            report,
            ReclassifyReport {
                examined: 3,
                changed: 1,
                unmatched: 1
            }
        );

        let doc = registry.find_document("https://x/1").await.unwrap().unwrap();
        assert!(doc.classification.categories.contains(&"Economy & Finance".to_string()));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let registry = MemoryRegistry::new();
        let taxonomy = Taxonomy::builtin().unwrap();
        seed(&registry, "https://x/1", "Ministry of Finance", Classification::default()).await;

        let report = reclassify(&registry, &taxonomy, true).await.unwrap();
        assert_eq!(report.changed, 1);

        let doc = registry.find_document("https://x/1").await.unwrap().unwrap();
        assert!(doc.classification.is_empty());
    }
}
