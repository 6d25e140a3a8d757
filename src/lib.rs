pub mod annotation;
pub mod corpus;
pub mod page;
pub mod panic_handler;
pub mod paths;
pub mod progress;
pub mod render;
pub mod reviser;
pub mod selector;
pub mod settings;

pub use corpus::{AlQuranCloudClient, CorpusClient, CorpusError, RenderUnit, Variant};
pub use page::{PageNumber, TOTAL_PAGES};
pub use progress::{FileProgressStore, MemoryProgressStore, ProgressSet, ProgressStore};
pub use reviser::{GenerateOutcome, Reviser};
pub use selector::{PageSelector, Selection};
