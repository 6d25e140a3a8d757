use crate::page::{PageNumber, TOTAL_PAGES};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Pages whose render has been durably completed.
///
/// Serialized as a plain JSON array of page numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressSet {
    pages: BTreeSet<PageNumber>,
}

impl ProgressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the page was not already present.
    pub fn insert(&mut self, page: PageNumber) -> bool {
        self.pages.insert(page)
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        self.pages.contains(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.pages.len() == TOTAL_PAGES as usize
    }

    /// Ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.pages.iter().copied()
    }

    /// Pages of the corpus not yet in the set, ascending.
    pub fn unrevised(&self) -> Vec<PageNumber> {
        PageNumber::all().filter(|p| !self.pages.contains(p)).collect()
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary::from_count(self.len())
    }
}

impl FromIterator<PageNumber> for ProgressSet {
    fn from_iter<I: IntoIterator<Item = PageNumber>>(iter: I) -> Self {
        Self {
            pages: iter.into_iter().collect(),
        }
    }
}

/// Revised/total counts with the percentage rounded to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub revised: usize,
    pub total: usize,
    pub percentage: f64,
}

impl ProgressSummary {
    pub fn from_count(revised: usize) -> Self {
        let total = TOTAL_PAGES as usize;
        let percentage = (revised as f64 / total as f64 * 1000.0).round() / 10.0;
        Self {
            revised,
            total,
            percentage,
        }
    }
}

/// Persistence for the progress set. Each call reads or writes the whole set.
///
/// `mark_complete` is a load-add-save cycle and is not atomic across
/// concurrent callers; the last writer wins.
pub trait ProgressStore: Send + Sync {
    /// Returns the empty set when nothing has been persisted yet.
    fn load(&self) -> Result<ProgressSet>;

    /// Replaces any previously stored set.
    fn save(&self, progress: &ProgressSet) -> Result<()>;

    fn mark_complete(&self, page: PageNumber) -> Result<ProgressSet> {
        let mut progress = self.load()?;
        if !progress.insert(page) {
            debug!("Page {page} was already marked complete");
        }
        self.save(&progress)?;
        Ok(progress)
    }
}

/// JSON file backed store.
pub struct FileProgressStore {
    file_path: PathBuf,
}

impl FileProgressStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&self) -> Result<ProgressSet> {
        if !self.file_path.exists() {
            return Ok(ProgressSet::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read progress file {:?}", self.file_path))?;
        let progress: ProgressSet = serde_json::from_str(&content)
            .with_context(|| format!("Malformed progress file {:?}", self.file_path))?;
        Ok(progress)
    }

    fn save(&self, progress: &ProgressSet) -> Result<()> {
        let content = serde_json::to_string(progress)?;
        write_atomically(&self.file_path, content.as_bytes())
    }
}

/// Store that never touches disk.
#[derive(Default)]
pub struct MemoryProgressStore {
    progress: Mutex<ProgressSet>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: impl IntoIterator<Item = PageNumber>) -> Self {
        Self {
            progress: Mutex::new(pages.into_iter().collect()),
        }
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self) -> Result<ProgressSet> {
        let guard = self
            .progress
            .lock()
            .map_err(|_| anyhow::anyhow!("progress lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, progress: &ProgressSet) -> Result<()> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|_| anyhow::anyhow!("progress lock poisoned"))?;
        *guard = progress.clone();
        Ok(())
    }
}

/// Writes to a sibling temp file and renames it over `path`, so readers
/// never see a half-written file.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {dir:?}"))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temp file in {dir:?}"))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {path:?}"))?;
    Ok(())
}
