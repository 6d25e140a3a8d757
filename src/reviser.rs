use crate::corpus::{CorpusClient, Variant};
use crate::page::{PageNumber, TOTAL_PAGES};
use crate::progress::{ProgressStore, ProgressSummary};
use crate::render::{RenderArtifact, RenderPipeline};
use crate::selector::{PageSelector, Selection};
use anyhow::Result;
use log::{error, info, warn};
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// What a top-level operation reports back to whoever drives it.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_link: Option<String>,
    /// Set when there was nothing left to render because every page is revised.
    pub exhausted: bool,
}

impl GenerateOutcome {
    fn failure(message: String, page: Option<PageNumber>) -> Self {
        Self {
            success: false,
            message,
            page,
            summary: None,
            artifact: None,
            study_link: None,
            exhausted: false,
        }
    }

    fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Self::failure(
                format!("Congratulations! You have revised all {TOTAL_PAGES} pages"),
                None,
            )
        }
    }

    fn rendered(artifact: RenderArtifact, study_link: Option<String>) -> Self {
        Self {
            success: true,
            message: format!("Page {} generated successfully", artifact.page),
            page: Some(artifact.page),
            summary: Some(artifact.summary),
            artifact: Some(artifact.path),
            study_link,
            exhausted: false,
        }
    }
}

/// Ties selection, rendering and progress together.
pub struct Reviser {
    progress: Arc<dyn ProgressStore>,
    corpus: Arc<dyn CorpusClient>,
    pipeline: RenderPipeline,
    study_base_url: String,
}

impl Reviser {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        corpus: Arc<dyn CorpusClient>,
        pipeline: RenderPipeline,
        study_base_url: impl Into<String>,
    ) -> Self {
        Self {
            progress,
            corpus,
            pipeline,
            study_base_url: study_base_url.into(),
        }
    }

    pub fn progress(&self) -> Result<ProgressSummary> {
        Ok(self.progress.load()?.summary())
    }

    /// Revised pages in ascending order.
    pub fn completed(&self) -> Result<Vec<PageNumber>> {
        Ok(self.progress.load()?.iter().collect())
    }

    /// Picks an unrevised page and renders it.
    pub fn generate_next(&self) -> GenerateOutcome {
        self.generate_next_with(&mut rand::thread_rng())
    }

    pub fn generate_next_with<R: Rng + ?Sized>(&self, rng: &mut R) -> GenerateOutcome {
        let selection = match PageSelector::new(self.progress.as_ref()).select_with(rng) {
            Ok(selection) => selection,
            Err(e) => {
                error!("Failed to load progress: {e:#}");
                return GenerateOutcome::failure(format!("Could not read progress: {e:#}"), None);
            }
        };
        match selection {
            Selection::Exhausted => {
                info!("All pages revised");
                GenerateOutcome::exhausted()
            }
            Selection::Page(page) => self.render_page(page),
        }
    }

    /// Renders a specific page, whether or not it was revised before.
    pub fn render_page(&self, page: PageNumber) -> GenerateOutcome {
        match self.pipeline.render(page) {
            Ok(artifact) => {
                let link = artifact
                    .first_verse
                    .map(|(group_id, seq)| self.study_url(group_id, seq));
                GenerateOutcome::rendered(artifact, link)
            }
            Err(e) => {
                error!("Page {page} failed: {e}");
                GenerateOutcome::failure(format!("Error generating page image: {e}"), Some(page))
            }
        }
    }

    /// Word-by-word link for the first verse on the page. Best effort.
    pub fn study_link(&self, page: PageNumber) -> Option<String> {
        match self.corpus.page_units(page, Variant::Arabic) {
            Ok(units) => units
                .first()
                .map(|unit| self.study_url(unit.group_id, unit.in_group_seq)),
            Err(e) => {
                warn!("No study link for page {page}: {e}");
                None
            }
        }
    }

    fn study_url(&self, group_id: u32, in_group_seq: u32) -> String {
        format!(
            "{}/{}/{}",
            self.study_base_url.trim_end_matches('/'),
            group_id,
            in_group_seq
        )
    }
}
