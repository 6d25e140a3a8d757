pub mod document;
pub mod engine;
pub mod pipeline;

pub use document::{PAGE_HEIGHT_ATTR, RenderDocument, summary_label};
pub use engine::{EngineError, EngineRun, HeadlessBrowser, RenderEngine};
pub use pipeline::{
    RenderArtifact, RenderConfig, RenderError, RenderPipeline, artifact_file_name,
};
