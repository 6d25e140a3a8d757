//! Word-by-word annotations for individual verses, cached on disk.

pub mod cache;
pub mod scrape;
pub mod store;

pub use cache::{AnnotationCache, EmptyAnnotationPolicy, UnitAnnotations};
pub use scrape::{BrowserFetcher, StaticHtmlFetcher, extract_words};
pub use store::{AnnotationMap, AnnotationStore, FileAnnotationStore, MemoryAnnotationStore};

use crate::corpus::RenderUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `(surah, ayah)` address of an annotated verse, written as `"surah:ayah"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AnnotationKey {
    pub group_id: u32,
    pub in_group_seq: u32,
}

impl AnnotationKey {
    pub fn new(group_id: u32, in_group_seq: u32) -> Self {
        Self {
            group_id,
            in_group_seq,
        }
    }
}

impl From<&RenderUnit> for AnnotationKey {
    fn from(unit: &RenderUnit) -> Self {
        Self::new(unit.group_id, unit.in_group_seq)
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.in_group_seq)
    }
}

impl FromStr for AnnotationKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, seq) = s
            .split_once(':')
            .ok_or_else(|| format!("annotation key '{s}' is not of the form group:seq"))?;
        let group_id = group
            .trim()
            .parse()
            .map_err(|_| format!("bad group in annotation key '{s}'"))?;
        let in_group_seq = seq
            .trim()
            .parse()
            .map_err(|_| format!("bad sequence in annotation key '{s}'"))?;
        Ok(Self::new(group_id, in_group_seq))
    }
}

impl From<AnnotationKey> for String {
    fn from(key: AnnotationKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for AnnotationKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One word with its optional transliteration and gloss.
///
/// Empty strings mean "unknown"; that is how the data file has always
/// stored missing values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    pub arabic: String,
    #[serde(default)]
    pub transliteration: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub grammar: String,
}

impl WordEntry {
    pub fn new(arabic: impl Into<String>) -> Self {
        Self {
            arabic: arabic.into(),
            ..Self::default()
        }
    }

    pub fn transliteration(&self) -> Option<&str> {
        non_empty(&self.transliteration)
    }

    pub fn translation(&self) -> Option<&str> {
        non_empty(&self.translation)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    /// Plain HTTP GET of the server-rendered page.
    #[default]
    Static,
    /// DOM dumped by a headless browser after scripts ran.
    #[serde(alias = "playwright")]
    Browser,
}

impl FromStr for FetchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(FetchMethod::Static),
            "browser" | "playwright" => Ok(FetchMethod::Browser),
            other => Err(format!("unknown scrape method '{other}'")),
        }
    }
}

/// Cached word-by-word data for one verse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub url: String,
    #[serde(alias = "surah")]
    pub group_id: u32,
    #[serde(alias = "ayah")]
    pub in_group_seq: u32,
    #[serde(default)]
    pub words: Vec<WordEntry>,
    pub scraped_at: String,
    #[serde(default)]
    pub method: FetchMethod,
    /// Set when the record stands in for a failed fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnotationRecord {
    pub fn new(key: AnnotationKey, url: impl Into<String>, method: FetchMethod, words: Vec<WordEntry>) -> Self {
        Self {
            url: url.into(),
            group_id: key.group_id,
            in_group_seq: key.in_group_seq,
            words,
            scraped_at: timestamp(),
            method,
            error: None,
        }
    }

    /// Empty record remembering why the fetch failed.
    pub fn failed(key: AnnotationKey, url: impl Into<String>, method: FetchMethod, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(key, url, method, Vec::new())
        }
    }

    pub fn key(&self) -> AnnotationKey {
        AnnotationKey::new(self.group_id, self.in_group_seq)
    }

    /// Usable records carry at least one word.
    pub fn is_usable(&self) -> bool {
        !self.words.is_empty()
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Source of word-by-word data for a single verse.
pub trait AnnotationFetcher: Send + Sync {
    fn method(&self) -> FetchMethod;

    /// Address the data is fetched from, recorded even when fetching fails.
    fn url_for(&self, key: AnnotationKey) -> String;

    fn fetch(&self, key: AnnotationKey) -> anyhow::Result<AnnotationRecord>;
}
