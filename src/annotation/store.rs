use super::{AnnotationKey, AnnotationRecord};
use crate::progress::write_atomically;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub type AnnotationMap = BTreeMap<AnnotationKey, AnnotationRecord>;

/// Whole-map persistence for annotation records.
pub trait AnnotationStore: Send + Sync {
    /// Returns an empty map when nothing has been stored yet.
    fn load(&self) -> Result<AnnotationMap>;

    fn save(&self, map: &AnnotationMap) -> Result<()>;
}

/// Pretty-printed JSON object keyed by `"surah:ayah"`.
pub struct FileAnnotationStore {
    file_path: PathBuf,
}

impl FileAnnotationStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl AnnotationStore for FileAnnotationStore {
    fn load(&self) -> Result<AnnotationMap> {
        if !self.file_path.exists() {
            return Ok(AnnotationMap::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read annotation cache {:?}", self.file_path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Malformed annotation cache {:?}", self.file_path))
    }

    fn save(&self, map: &AnnotationMap) -> Result<()> {
        let content = serde_json::to_string_pretty(map)?;
        write_atomically(&self.file_path, content.as_bytes())?;
        log::debug!("Saved {} annotation records to {:?}", map.len(), self.file_path);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAnnotationStore {
    map: Mutex<AnnotationMap>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn load(&self) -> Result<AnnotationMap> {
        let guard = self
            .map
            .lock()
            .map_err(|_| anyhow::anyhow!("annotation store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, map: &AnnotationMap) -> Result<()> {
        let mut guard = self
            .map
            .lock()
            .map_err(|_| anyhow::anyhow!("annotation store lock poisoned"))?;
        *guard = map.clone();
        Ok(())
    }
}
