use super::document::RenderDocument;
use super::engine::{EngineError, RenderEngine};
use crate::corpus::{CorpusClient, CorpusError, Variant};
use crate::page::PageNumber;
use crate::progress::ProgressStore;
use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub output_dir: PathBuf,
    pub variant: Variant,
    /// Total number of engine attempts, not additional ones.
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            variant: Variant::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// A page image that has been written and recorded as revised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderArtifact {
    pub page: PageNumber,
    pub path: PathBuf,
    pub summary: String,
    pub variant: Variant,
    /// `(group_id, in_group_seq)` of the first verse on the page.
    #[serde(skip)]
    pub first_verse: Option<(u32, u32)>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] CorpusError),

    #[error("cannot create output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("render failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("page rendered but progress was not saved: {0:#}")]
    Progress(anyhow::Error),
}

pub fn artifact_file_name(page: PageNumber, variant: Variant) -> String {
    format!("quran_page_{}_{}.png", page, variant.tag())
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Fetch, build, rasterize with bounded retries, then record progress.
///
/// The corpus fetch happens once; only the document/engine steps are retried.
/// Progress is written only after the image is on disk and readable.
pub struct RenderPipeline {
    corpus: Arc<dyn CorpusClient>,
    engine: Arc<dyn RenderEngine>,
    progress: Arc<dyn ProgressStore>,
    config: RenderConfig,
    sleep: Sleeper,
}

impl RenderPipeline {
    pub fn new(
        corpus: Arc<dyn CorpusClient>,
        engine: Arc<dyn RenderEngine>,
        progress: Arc<dyn ProgressStore>,
        config: RenderConfig,
    ) -> Self {
        Self {
            corpus,
            engine,
            progress,
            config,
            sleep: Box::new(thread::sleep),
        }
    }

    /// Replaces the backoff sleep, mainly so tests can observe it.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn artifact_path(&self, page: PageNumber) -> PathBuf {
        self.config
            .output_dir
            .join(artifact_file_name(page, self.config.variant))
    }

    pub fn render(&self, page: PageNumber) -> Result<RenderArtifact, RenderError> {
        let variant = self.config.variant;
        let units = self.corpus.page_units(page, variant)?;
        let first_verse = units.first().map(|u| (u.group_id, u.in_group_seq));
        let document = RenderDocument::build(page, &units, variant);
        debug!(
            "Built document for page {page}: {} verses, {}",
            units.len(),
            document.summary
        );

        fs::create_dir_all(&self.config.output_dir).map_err(|source| RenderError::OutputDir {
            path: self.config.output_dir.clone(),
            source,
        })?;
        let output = self.artifact_path(page);

        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            info!("Attempt {attempt}/{attempts} for page {page}");
            match self.attempt(&document, &output) {
                Ok(()) => {
                    self.progress
                        .mark_complete(page)
                        .map_err(RenderError::Progress)?;
                    info!("Page {page} rendered to {output:?}");
                    return Ok(RenderArtifact {
                        page,
                        path: output,
                        summary: document.summary,
                        variant,
                        first_verse,
                    });
                }
                Err(err) => {
                    warn!("Attempt {attempt}/{attempts} for page {page} failed: {err:#}");
                    discard_partial(&output);
                    last_error = format!("{err:#}");
                    if attempt < attempts {
                        (self.sleep)(self.config.backoff);
                    }
                }
            }
        }

        Err(RenderError::Exhausted {
            attempts,
            last: last_error,
        })
    }

    /// One pass of materialize + capture + verify. The temporary document is
    /// dropped, and therefore deleted, before this returns.
    fn attempt(&self, document: &RenderDocument, output: &Path) -> anyhow::Result<()> {
        let file = document.materialize()?;
        let result = self.engine.capture(file.path(), output);
        match &result {
            Ok(run) => debug!(
                "Render engine succeeded\nstdout: {}\nstderr: {}",
                run.stdout.trim(),
                run.stderr.trim()
            ),
            Err(EngineError::Exit {
                code,
                stdout,
                stderr,
            }) => warn!(
                "Render engine exit status {code:?}\nstdout: {}\nstderr: {}",
                stdout.trim(),
                stderr.trim()
            ),
            Err(_) => {}
        }
        result?;
        verify_artifact(output)?;
        Ok(())
    }
}

fn verify_artifact(path: &Path) -> Result<(), EngineError> {
    let size = imagesize::size(path).map_err(|e| EngineError::BadOutput {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if size.width == 0 || size.height == 0 {
        return Err(EngineError::BadOutput {
            path: path.to_path_buf(),
            detail: format!("empty image {}x{}", size.width, size.height),
        });
    }
    Ok(())
}

fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove partial image {path:?}: {e}");
        }
    }
}
