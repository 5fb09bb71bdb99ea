// Test mocks for the press-release pipeline.
//
// One mock per external seam:
// - MockSource (ContentSource): date-independent listing plus URL→page map
// - MockGenerator (ContentGenerator): deterministic variant sets, counted per kind
// - MockTranslator (Translator): "[code] text" output, failing languages on demand
// - ScriptedModel (LanguageModel): replays a fixed list of provider replies
//
// The registry and ledger need no mock; `MemoryRegistry` is used directly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Barrier;

use ai_client::{AiError, LanguageModel};
use pressroom_common::{
    DiscoveredRelease, FetchedContent, Language, Taxonomy, VariantItem, VariantKind,
};

use crate::deps::PipelineDeps;
use crate::store::MemoryRegistry;
use crate::traits::{ContentGenerator, ContentSource, Generated, Translator};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Listing and page map. Unregistered URLs return `Err`, like an unreachable
/// page; `.on_empty()` registers a page with no content.
#[derive(Default)]
pub struct MockSource {
    listing: Vec<DiscoveredRelease>,
    pages: HashMap<String, FetchedContent>,
    empty: HashSet<String>,
    listing_failures: AtomicU32,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release to the listing and register its page.
    pub fn on_release(mut self, ministry: &str, url: &str, text: &str) -> Self {
        self.listing.push(DiscoveredRelease {
            ministry: ministry.to_string(),
            title: format!("Release at {url}"),
            url: url.to_string(),
        });
        self.pages.insert(
            url.to_string(),
            FetchedContent {
                text: text.to_string(),
                ..FetchedContent::default()
            },
        );
        self
    }

    /// Listed, but fetching it always fails.
    pub fn on_broken_release(mut self, ministry: &str, url: &str) -> Self {
        self.listing.push(DiscoveredRelease {
            ministry: ministry.to_string(),
            title: format!("Release at {url}"),
            url: url.to_string(),
        });
        self
    }

    pub fn on_page(mut self, url: &str, content: FetchedContent) -> Self {
        self.pages.insert(url.to_string(), content);
        self
    }

    pub fn on_empty(mut self, url: &str) -> Self {
        self.empty.insert(url.to_string());
        self
    }

    /// The next `n` listing calls fail.
    pub fn failing_listing(self, n: u32) -> Self {
        self.listing_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ContentSource for MockSource {
    async fn discover(&self, _date: NaiveDate) -> Result<Vec<DiscoveredRelease>> {
        let remaining = self.listing_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.listing_failures.store(remaining - 1, Ordering::SeqCst);
            bail!("MockSource: listing unavailable");
        }
        Ok(self.listing.clone())
    }

    async fn fetch(&self, url: &str) -> Result<Option<FetchedContent>> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
        if self.empty.contains(url) {
            return Ok(None);
        }
        self.pages
            .get(url)
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow!("MockSource: no page registered for {url}"))
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Deterministic generator: summary plus 2 simplified, 2 oversimplified and
/// 3 key points per call.
pub struct MockGenerator {
    headline: Option<String>,
    summary_rendezvous: Option<Arc<Barrier>>,
    calls: Mutex<HashMap<VariantKind, usize>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            headline: Some("Government Announces New Scheme".to_string()),
            summary_rendezvous: None,
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headline(mut self, headline: &str) -> Self {
        self.headline = Some(headline.to_string());
        self
    }

    /// Summaries come back with a blank headline.
    pub fn without_headline(mut self) -> Self {
        self.headline = None;
        self
    }

    /// Summary calls block until `n` of them are in flight at once.
    pub fn overlapping_summaries(mut self, n: usize) -> Self {
        self.summary_rendezvous = Some(Arc::new(Barrier::new(n)));
        self
    }

    pub fn calls(&self, kind: VariantKind) -> usize {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, kind: VariantKind, text: &str) -> Result<Generated> {
        *self.calls.lock().unwrap().entry(kind).or_default() += 1;
        if let (VariantKind::Summary, Some(rendezvous)) = (kind, &self.summary_rendezvous) {
            rendezvous.wait().await;
        }
        let lead: String = text.chars().take(40).collect();
        let generated = match kind {
            VariantKind::Original => bail!("MockGenerator: original is not generated"),
            VariantKind::Summary => Generated::Summary {
                sentence: format!("In short: {lead}"),
                headline: self.headline.clone().unwrap_or_default(),
            },
            VariantKind::Simplified | VariantKind::Oversimplified => Generated::Items(
                (1..=2)
                    .map(|i| VariantItem::new(format!("<p>{kind} {i}: {lead}</p>"), Some(format!("{kind} point {i}"))))
                    .collect(),
            ),
            VariantKind::KeyPoints => Generated::Items(
                (1..=3)
                    .map(|i| VariantItem::new(format!("Key point {i}"), None))
                    .collect(),
            ),
        };
        Ok(generated)
    }
}

// ---------------------------------------------------------------------------
// MockTranslator
// ---------------------------------------------------------------------------

/// Prefixes text with the language code. Languages marked failing always
/// return `Err`, as if every internal retry was spent.
#[derive(Default)]
pub struct MockTranslator {
    failing: HashSet<Language>,
    failing_fragments: Vec<String>,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, language: Language) -> Self {
        self.failing.insert(language);
        self
    }

    /// Any text containing `fragment` fails to translate.
    pub fn failing_on_text(mut self, fragment: &str) -> Self {
        self.failing_fragments.push(fragment.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&target) {
            bail!("MockTranslator: {target} is unavailable");
        }
        if self.failing_fragments.iter().any(|f| text.contains(f.as_str())) {
            bail!("MockTranslator: refused text");
        }
        Ok(format!("[{}] {text}", target.code()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Replays provider replies in order. Once exhausted every call returns
/// `AiError::EmptyResponse`.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(replies: Vec<&str>) -> Self {
        Self::new(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete_json(&self, _system: &str, _user: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AiError::EmptyResponse("scripted")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deps wired to mocks and a fresh in-memory registry, which is returned
/// alongside for assertions.
pub fn memory_deps(
    source: Arc<MockSource>,
    generator: Arc<MockGenerator>,
    translator: Arc<MockTranslator>,
) -> (PipelineDeps, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new());
    let taxonomy = Taxonomy::builtin().unwrap();
    let deps = PipelineDeps::builder()
        .source(source)
        .generator(generator)
        .translator(translator)
        .registry(registry.clone())
        .ledger(registry.clone())
        .taxonomy(Arc::new(taxonomy))
        .build();
    (deps, registry)
}
