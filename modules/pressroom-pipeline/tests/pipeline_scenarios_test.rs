//! End-to-end pipeline scenarios against mocks and the in-memory registry.
//!
//! Every test drives the real `Pipeline` through a `LocalQueue` and waits for
//! the whole task graph to drain before asserting. Time is paused so task
//! retries and backoffs complete instantly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use pressroom_common::{Language, NewDocument, PressroomError, VariantKind};
use pressroom_pipeline::pipeline::process::SourceDefaults;
use pressroom_pipeline::pipeline::{DiscoveryRequest, ProcessOutcome, TranslateOutcome};
use pressroom_pipeline::store::MemoryRegistry;
use pressroom_pipeline::testing::{memory_deps, MockGenerator, MockSource, MockTranslator};
use pressroom_pipeline::traits::{DocumentRegistry, TaskQueue};
use pressroom_pipeline::{LocalQueue, Pipeline, PipelineDeps, RetryPolicy, Task};

const FINANCE: &str = "Ministry of Finance";
const BUDGET_URL: &str = "https://x/1";
const BUDGET_TEXT: &str = "Budget increases allocation for infrastructure and health.";

struct Harness {
    pipeline: Arc<Pipeline>,
    queue: LocalQueue,
    registry: Arc<MemoryRegistry>,
    source: Arc<MockSource>,
    generator: Arc<MockGenerator>,
    translator: Arc<MockTranslator>,
}

impl Harness {
    fn new(source: MockSource, generator: MockGenerator, translator: MockTranslator) -> Self {
        let source = Arc::new(source);
        let generator = Arc::new(generator);
        let translator = Arc::new(translator);
        let (deps, registry) = memory_deps(source.clone(), generator.clone(), translator.clone());
        let pipeline = Arc::new(Pipeline::new(deps));
        let queue = LocalQueue::new(
            pipeline.clone(),
            4,
            RetryPolicy::new(3, Duration::from_secs(5)),
        );
        Self {
            pipeline,
            queue,
            registry,
            source,
            generator,
            translator,
        }
    }

    fn budget() -> Self {
        Self::new(
            MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
            MockGenerator::new().with_headline("India Unveils Budget 2025"),
            MockTranslator::new(),
        )
    }

    async fn discover(&self) {
        let date = NaiveDate::from_ymd_opt(2025, 5, 24).unwrap();
        self.pipeline
            .discover(&DiscoveryRequest::for_date(date), &self.queue)
            .await
            .unwrap();
        self.queue.wait_idle().await;
    }

    async fn process(&self, url: &str) -> anyhow::Result<ProcessOutcome> {
        let outcome = self
            .pipeline
            .process_document(url, FINANCE, SourceDefaults::default(), &self.queue)
            .await;
        self.queue.wait_idle().await;
        outcome
    }

    async fn document_id(&self, url: &str) -> Uuid {
        self.registry.find_document(url).await.unwrap().expect("document exists").id
    }

    async fn coverage(&self, document_id: Uuid) -> BTreeMap<(Language, VariantKind), usize> {
        let mut counts = BTreeMap::new();
        for variant in self.registry.all_variants(document_id).await.unwrap() {
            *counts.entry((variant.language, variant.kind)).or_insert(0) += 1;
        }
        counts
    }
}

fn non_source_languages() -> impl Iterator<Item = Language> {
    Language::ALL.into_iter().filter(|l| *l != Language::En)
}

/// 1 summary, 2 simplified, 2 oversimplified, 3 key points per language.
fn assert_full_coverage(registry: &MemoryRegistry, document_id: Uuid, language: Language) {
    assert_eq!(registry.count_variants(document_id, VariantKind::Summary, language), 1, "{language} summary");
    assert_eq!(registry.count_variants(document_id, VariantKind::Simplified, language), 2, "{language} simplified");
    assert_eq!(
        registry.count_variants(document_id, VariantKind::Oversimplified, language),
        2,
        "{language} oversimplified"
    );
    assert_eq!(registry.count_variants(document_id, VariantKind::KeyPoints, language), 3, "{language} keypoints");
}

// ---------------------------------------------------------------------------
// Scenario 1: discovery through readiness
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn discovered_release_ends_ready_in_every_language() {
    let h = Harness::budget();
    h.discover().await;

    let document = h.registry.find_document(BUDGET_URL).await.unwrap().unwrap();
    assert_eq!(document.title, "India Unveils Budget 2025");
    assert!(document.is_ready);
    assert!(document.classification.categories.contains(&"Economy & Finance".to_string()));

    let ministry = h.registry.get_ministry(document.ministry_id).await.unwrap().unwrap();
    assert_eq!(ministry.name, FINANCE);

    assert_eq!(h.registry.count_variants(document.id, VariantKind::Original, Language::En), 1);
    assert_full_coverage(&h.registry, document.id, Language::En);
    for language in non_source_languages() {
        assert_full_coverage(&h.registry, document.id, language);
    }
    assert_eq!(h.registry.total_variants(), 1 + 11 * 8);

    let hindi = h
        .registry
        .variants(document.id, VariantKind::Summary, Language::Hi)
        .await
        .unwrap();
    assert_eq!(hindi[0].title.as_deref(), Some("[hi] India Unveils Budget 2025"));

    assert_eq!(h.registry.available_languages(document.id).await.unwrap().len(), 11);
    assert_eq!(h.registry.ready_documents().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn source_language_sets_are_generated_once_and_never_translated() {
    let h = Harness::budget();
    h.discover().await;

    for kind in VariantKind::GENERATED {
        assert_eq!(h.generator.calls(kind), 1, "{kind}");
    }
    // 10 languages: summary sentence + headline, 2 + 2 titled items, 3 untitled points.
    assert_eq!(h.translator.calls(), 10 * (2 + 4 + 4 + 3));
}

// ---------------------------------------------------------------------------
// Scenario 2: replay safety
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn replaying_a_finished_document_changes_nothing() {
    let h = Harness::budget();

    let first = h.process(BUDGET_URL).await.unwrap();
    assert!(matches!(first, ProcessOutcome::Dispatched { subtasks: 40, .. }));
    let document_id = h.document_id(BUDGET_URL).await;
    let before = h.coverage(document_id).await;
    let generator_calls = h.generator.total_calls();
    let translator_calls = h.translator.calls();

    let second = h.process(BUDGET_URL).await.unwrap();
    assert_eq!(second, ProcessOutcome::Finalized { document_id });

    assert_eq!(h.registry.count_documents(BUDGET_URL), 1);
    assert_eq!(h.coverage(document_id).await, before);
    assert_eq!(h.generator.total_calls(), generator_calls);
    assert_eq!(h.translator.calls(), translator_calls);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_delivery_creates_one_document() {
    // Both deliveries are held inside headline generation until the other
    // arrives, so both pass the existence check before either creates.
    let h = Harness::new(
        MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
        MockGenerator::new()
            .with_headline("India Unveils Budget 2025")
            .overlapping_summaries(2),
        MockTranslator::new(),
    );

    h.queue.enqueue(Task::process(BUDGET_URL, FINANCE)).await.unwrap();
    h.queue.enqueue(Task::process(BUDGET_URL, FINANCE)).await.unwrap();
    h.queue.wait_idle().await;

    assert_eq!(h.generator.calls(VariantKind::Summary), 2);
    assert_eq!(h.source.fetch_count(BUDGET_URL), 2);
    assert_eq!(h.registry.count_documents(BUDGET_URL), 1);
    let document = h.registry.find_document(BUDGET_URL).await.unwrap().unwrap();
    assert!(document.is_ready);
    assert_eq!(h.registry.count_variants(document.id, VariantKind::Original, Language::En), 1);
    assert_eq!(h.registry.ready_documents().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rediscovery_skips_known_urls() {
    let h = Harness::budget();
    h.discover().await;

    let date = NaiveDate::from_ymd_opt(2025, 5, 24).unwrap();
    let outcome = h
        .pipeline
        .discover(&DiscoveryRequest::for_date(date), &h.queue)
        .await
        .unwrap();
    h.queue.wait_idle().await;

    assert_eq!(outcome.listed, 1);
    assert_eq!(outcome.already_known, 1);
    assert_eq!(outcome.dispatched, 0);
    assert_eq!(h.source.fetch_count(BUDGET_URL), 1);
}

// ---------------------------------------------------------------------------
// Scenario 3: translation outage
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn one_language_down_still_finalizes() {
    let h = Harness::new(
        MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
        MockGenerator::new(),
        MockTranslator::new().failing_for(Language::Ta),
    );
    h.discover().await;

    let document_id = h.document_id(BUDGET_URL).await;
    let document = h.registry.get_document(document_id).await.unwrap().unwrap();
    assert!(document.is_ready);

    for kind in VariantKind::ALL {
        assert_eq!(h.registry.count_variants(document_id, kind, Language::Ta), 0, "{kind}");
    }
    for language in non_source_languages().filter(|l| *l != Language::Ta) {
        assert_full_coverage(&h.registry, document_id, language);
    }
    assert!(!h.registry.available_languages(document_id).await.unwrap().contains(&Language::Ta));
}

#[tokio::test(start_paused = true)]
async fn every_translation_failing_still_finalizes() {
    let mut translator = MockTranslator::new();
    for language in non_source_languages() {
        translator = translator.failing_for(language);
    }
    let h = Harness::new(
        MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
        MockGenerator::new(),
        translator,
    );
    h.discover().await;

    let document_id = h.document_id(BUDGET_URL).await;
    assert!(h.registry.get_document(document_id).await.unwrap().unwrap().is_ready);
    assert_eq!(
        h.registry.available_languages(document_id).await.unwrap(),
        vec![Language::En]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_item_does_not_block_its_siblings() {
    // "point 1" appears in the first simplified/oversimplified title and the
    // first key point body.
    let h = Harness::new(
        MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
        MockGenerator::new(),
        MockTranslator::new().failing_on_text("point 1"),
    );
    h.discover().await;

    let document_id = h.document_id(BUDGET_URL).await;
    assert_eq!(h.registry.count_variants(document_id, VariantKind::KeyPoints, Language::En), 3);
    assert_eq!(h.registry.count_variants(document_id, VariantKind::KeyPoints, Language::Hi), 2);

    let simplified = h
        .registry
        .variants(document_id, VariantKind::Simplified, Language::Hi)
        .await
        .unwrap();
    assert_eq!(simplified.len(), 2);
    assert_eq!(simplified.iter().filter(|v| v.title.is_none()).count(), 1);
    assert!(simplified
        .iter()
        .any(|v| v.title.as_deref() == Some("[hi] simplified point 2")));
}

// ---------------------------------------------------------------------------
// Isolation and failure paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fetch_failure_does_not_block_siblings() {
    let h = Harness::new(
        MockSource::new()
            .on_broken_release(FINANCE, "https://x/a")
            .on_release(FINANCE, "https://x/b", BUDGET_TEXT),
        MockGenerator::new(),
        MockTranslator::new(),
    );
    h.discover().await;

    assert!(h.registry.find_document("https://x/a").await.unwrap().is_none());
    let b = h.registry.find_document("https://x/b").await.unwrap().unwrap();
    assert!(b.is_ready);
    assert_eq!(h.source.fetch_count("https://x/a"), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_page_creates_nothing() {
    let h = Harness::new(
        MockSource::new().on_empty(BUDGET_URL),
        MockGenerator::new(),
        MockTranslator::new(),
    );

    assert_eq!(h.process(BUDGET_URL).await.unwrap(), ProcessOutcome::NoContent);
    assert_eq!(h.registry.count_documents(BUDGET_URL), 0);
    assert_eq!(h.generator.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_headline_blocks_record_creation() {
    let h = Harness::new(
        MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
        MockGenerator::new().without_headline(),
        MockTranslator::new(),
    );

    let err = h.process(BUDGET_URL).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PressroomError>(),
        Some(PressroomError::MissingHeadline { .. })
    ));
    assert_eq!(h.registry.count_documents(BUDGET_URL), 0);

    // Through the queue the task is retried, then given up.
    h.queue.enqueue(Task::process(BUDGET_URL, FINANCE)).await.unwrap();
    h.queue.wait_idle().await;
    assert_eq!(h.generator.calls(VariantKind::Summary), 1 + 3);
    assert_eq!(h.registry.count_documents(BUDGET_URL), 0);
}

#[tokio::test(start_paused = true)]
async fn discovery_limit_and_url_filter_narrow_the_pass() {
    let h = Harness::new(
        MockSource::new()
            .on_release(FINANCE, "https://x/1", BUDGET_TEXT)
            .on_release(FINANCE, "https://x/2", BUDGET_TEXT)
            .on_release(FINANCE, "https://x/3", BUDGET_TEXT),
        MockGenerator::new(),
        MockTranslator::new(),
    );
    let date = NaiveDate::from_ymd_opt(2025, 5, 24).unwrap();

    let only_two = DiscoveryRequest {
        date,
        limit: Some(1),
        url: Some("https://x/2".into()),
    };
    let outcome = h.pipeline.discover(&only_two, &h.queue).await.unwrap();
    h.queue.wait_idle().await;

    assert_eq!(outcome.dispatched, 1);
    assert_eq!(h.registry.count_documents("https://x/1"), 0);
    assert_eq!(h.registry.count_documents("https://x/2"), 1);
    assert_eq!(h.registry.count_documents("https://x/3"), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_listing_fails_the_whole_pass() {
    let h = Harness::new(
        MockSource::new()
            .on_release(FINANCE, BUDGET_URL, BUDGET_TEXT)
            .failing_listing(1),
        MockGenerator::new(),
        MockTranslator::new(),
    );
    let date = NaiveDate::from_ymd_opt(2025, 5, 24).unwrap();

    assert!(h.pipeline.discover(&DiscoveryRequest::for_date(date), &h.queue).await.is_err());
    assert_eq!(h.queue.in_flight(), 0);
    assert_eq!(h.registry.count_documents(BUDGET_URL), 0);
}

// ---------------------------------------------------------------------------
// Idempotence guard
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn saved_unit_is_never_translated_again() {
    let h = Harness::budget();
    let ministry = h.registry.get_or_create_ministry(FINANCE).await.unwrap();
    let (document, _) = h
        .registry
        .create_document_if_absent(NewDocument {
            source_url: BUDGET_URL.into(),
            title: "t".into(),
            original_text: BUDGET_TEXT.into(),
            ministry_id: ministry.id,
            published_at: Utc::now(),
            origin_office: None,
            classification: Default::default(),
        })
        .await
        .unwrap();

    assert!(!h.registry.variant_exists(document.id, VariantKind::Summary, Language::Hi).await.unwrap());

    let first = h
        .pipeline
        .translate_and_save(document.id, Language::Hi, VariantKind::Summary, "Budget grows", Some("Budget"))
        .await
        .unwrap();
    assert_eq!(first, TranslateOutcome::Saved);
    assert!(h.registry.variant_exists(document.id, VariantKind::Summary, Language::Hi).await.unwrap());
    let calls = h.translator.calls();

    let second = h
        .pipeline
        .translate_and_save(document.id, Language::Hi, VariantKind::Summary, "Budget grows", Some("Budget"))
        .await
        .unwrap();
    assert_eq!(second, TranslateOutcome::AlreadyPresent);
    assert_eq!(h.translator.calls(), calls);
    assert_eq!(h.registry.count_variants(document.id, VariantKind::Summary, Language::Hi), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_dispatches_only_missing_units() {
    let h = Harness::new(
        MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT),
        MockGenerator::new(),
        MockTranslator::new().failing_for(Language::Hi),
    );

    h.process(BUDGET_URL).await.unwrap();
    let document_id = h.document_id(BUDGET_URL).await;

    let replay = h.process(BUDGET_URL).await.unwrap();
    assert_eq!(
        replay,
        ProcessOutcome::Dispatched {
            document_id,
            subtasks: 4
        }
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_target_language_fans_out_once() {
    let (deps, registry) = memory_deps(
        Arc::new(MockSource::new().on_release(FINANCE, BUDGET_URL, BUDGET_TEXT)),
        Arc::new(MockGenerator::new()),
        Arc::new(MockTranslator::new()),
    );
    let deps = PipelineDeps {
        target_languages: vec![Language::Hi, Language::Hi],
        ..deps
    };
    let pipeline = Arc::new(Pipeline::new(deps));
    let queue = LocalQueue::new(pipeline.clone(), 4, RetryPolicy::new(3, Duration::from_secs(5)));

    let outcome = pipeline
        .process_document(BUDGET_URL, FINANCE, SourceDefaults::default(), &queue)
        .await
        .unwrap();
    queue.wait_idle().await;

    assert!(matches!(outcome, ProcessOutcome::Dispatched { subtasks: 4, .. }));
    let document = registry.find_document(BUDGET_URL).await.unwrap().unwrap();
    assert!(document.is_ready);
    assert_eq!(registry.count_variants(document.id, VariantKind::KeyPoints, Language::Hi), 3);
    assert_eq!(registry.count_variants(document.id, VariantKind::Summary, Language::Hi), 1);
}

#[tokio::test]
async fn translation_for_unknown_document_is_dropped() {
    let h = Harness::budget();
    let outcome = h
        .pipeline
        .translate_and_save(Uuid::new_v4(), Language::Hi, VariantKind::Summary, "x", None)
        .await
        .unwrap();
    assert_eq!(outcome, TranslateOutcome::DocumentMissing);
    assert_eq!(h.translator.calls(), 0);
}

#[test]
fn example_config_parses() {
    let config: pressroom_common::FileConfig =
        toml::from_str(include_str!("../config/pressroom.toml")).unwrap();
    config.validate().unwrap();
    assert_eq!(config.pipeline.target_languages().len(), 10);
}
