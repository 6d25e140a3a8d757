use super::store::{AnnotationMap, AnnotationStore};
use super::{AnnotationFetcher, AnnotationKey, AnnotationRecord};
use crate::corpus::{CorpusClient, RenderUnit, Variant};
use crate::page::PageNumber;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_SCRAPE_DELAY: Duration = Duration::from_secs(1);

/// What to do with a cached record that has no words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyAnnotationPolicy {
    /// Treat it as final and never fetch that verse again.
    #[default]
    Keep,
    /// Treat it as a miss and fetch again on the next lookup.
    Retry,
}

/// One verse of a page together with whatever annotation is cached for it.
#[derive(Debug, Clone, Serialize)]
pub struct UnitAnnotations {
    pub key: AnnotationKey,
    pub text: String,
    pub record: Option<AnnotationRecord>,
}

impl UnitAnnotations {
    /// True when a usable record is cached for this verse.
    pub fn has_words(&self) -> bool {
        self.record.as_ref().is_some_and(AnnotationRecord::is_usable)
    }
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Read-through cache of word-by-word records.
///
/// Every write re-reads the stored map and writes it back whole.
pub struct AnnotationCache {
    store: Arc<dyn AnnotationStore>,
    fetcher: Arc<dyn AnnotationFetcher>,
    corpus: Arc<dyn CorpusClient>,
    policy: EmptyAnnotationPolicy,
    delay: Duration,
    sleep: Sleeper,
}

impl AnnotationCache {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        fetcher: Arc<dyn AnnotationFetcher>,
        corpus: Arc<dyn CorpusClient>,
    ) -> Self {
        Self {
            store,
            fetcher,
            corpus,
            policy: EmptyAnnotationPolicy::default(),
            delay: DEFAULT_SCRAPE_DELAY,
            sleep: Box::new(thread::sleep),
        }
    }

    pub fn with_policy(mut self, policy: EmptyAnnotationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause between consecutive fetches in `ensure_scraped`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    fn is_hit(&self, record: &AnnotationRecord) -> bool {
        match self.policy {
            EmptyAnnotationPolicy::Keep => true,
            EmptyAnnotationPolicy::Retry => record.is_usable(),
        }
    }

    /// Never fails: a fetch error becomes an empty record carrying the error.
    fn fetch_or_empty(&self, key: AnnotationKey) -> AnnotationRecord {
        debug!("Fetching annotations for {key} via {:?}", self.fetcher.method());
        match self.fetcher.fetch(key) {
            Ok(record) => {
                info!("Fetched {} words for {key}", record.words.len());
                record
            }
            Err(e) => {
                warn!("Failed to fetch annotations for {key}: {e:#}");
                AnnotationRecord::failed(
                    key,
                    self.fetcher.url_for(key),
                    self.fetcher.method(),
                    format!("{e:#}"),
                )
            }
        }
    }

    /// Cached record for `key`, fetching and storing it on a miss.
    /// Empty results are stored too.
    pub fn get(&self, key: AnnotationKey) -> Result<AnnotationRecord> {
        let cached = self.store.load()?;
        if let Some(record) = cached.get(&key) {
            if self.is_hit(record) {
                debug!("Annotation cache hit for {key}");
                return Ok(record.clone());
            }
        }

        let record = self.fetch_or_empty(key);
        let mut map = self.store.load()?;
        map.insert(key, record.clone());
        self.store.save(&map)?;
        Ok(record)
    }

    fn page_units(&self, page: PageNumber) -> Result<Vec<RenderUnit>> {
        self.corpus
            .page_units(page, Variant::Arabic)
            .with_context(|| format!("Failed to look up verses on page {page}"))
    }

    /// True when at least one verse of the page has a usable record.
    /// Does not fetch annotations.
    pub fn has_data(&self, page: PageNumber) -> Result<bool> {
        let units = self.page_units(page)?;
        let map = self.store.load()?;
        Ok(has_usable(&map, &units))
    }

    /// Fetches every verse of `page` that is not cached yet, unless the page
    /// already has usable data. Returns whether anything was fetched.
    pub fn ensure_scraped(&self, page: PageNumber) -> Result<bool> {
        let units = self.page_units(page)?;
        let cached = self.store.load()?;
        if has_usable(&cached, &units) {
            debug!("Page {page} already has annotation data");
            return Ok(false);
        }

        let pending: Vec<AnnotationKey> = units
            .iter()
            .map(AnnotationKey::from)
            .filter(|key| match cached.get(key) {
                Some(record) => !self.is_hit(record),
                None => true,
            })
            .collect();
        if pending.is_empty() {
            return Ok(false);
        }

        info!("Fetching annotations for {} verses on page {page}", pending.len());
        let mut fetched = Vec::with_capacity(pending.len());
        for (i, key) in pending.iter().enumerate() {
            if i > 0 {
                (self.sleep)(self.delay);
            }
            fetched.push(self.fetch_or_empty(*key));
        }

        let mut map = self.store.load()?;
        for record in fetched {
            map.insert(record.key(), record);
        }
        self.store.save(&map)?;
        Ok(true)
    }

    /// Verses of the page in order, each with its cached record if any.
    pub fn page_annotations(&self, page: PageNumber) -> Result<Vec<UnitAnnotations>> {
        let units = self.page_units(page)?;
        let map = self.store.load()?;
        Ok(units
            .iter()
            .map(|unit| {
                let key = AnnotationKey::from(unit);
                UnitAnnotations {
                    key,
                    text: unit.text.clone(),
                    record: map.get(&key).cloned(),
                }
            })
            .collect())
    }
}

fn has_usable(map: &AnnotationMap, units: &[RenderUnit]) -> bool {
    units
        .iter()
        .filter_map(|unit| map.get(&AnnotationKey::from(unit)))
        .any(AnnotationRecord::is_usable)
}
