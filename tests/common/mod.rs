#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter};
use std::time::Duration;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use murajaah::annotation::{
    AnnotationFetcher, AnnotationKey, AnnotationRecord, FetchMethod, WordEntry,
};
use murajaah::render::{EngineError, EngineRun, RenderEngine};
use murajaah::{
    CorpusClient, CorpusError, PageNumber, ProgressSet, ProgressStore, RenderUnit, Variant,
};

pub fn page(n: i64) -> PageNumber {
    PageNumber::new(n).unwrap()
}

pub fn unit(group_id: u32, name: &str, seq: u32, text: &str) -> RenderUnit {
    RenderUnit {
        group_id,
        group_name: name.to_string(),
        in_group_seq: seq,
        text: text.to_string(),
        translation: None,
    }
}

/// Corpus with a fixed set of pages; anything else is a 404.
#[derive(Default)]
pub struct FakeCorpus {
    pages: HashMap<PageNumber, Vec<RenderUnit>>,
    pub calls: AtomicUsize,
}

impl FakeCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: PageNumber, units: Vec<RenderUnit>) -> Self {
        self.pages.insert(page, units);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CorpusClient for FakeCorpus {
    fn page_units(&self, page: PageNumber, variant: Variant) -> Result<Vec<RenderUnit>, CorpusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut units = self
            .pages
            .get(&page)
            .cloned()
            .ok_or(CorpusError::Status { page, status: 404 })?;
        if variant == Variant::Translation {
            for unit in &mut units {
                unit.translation = Some(format!("translation of {}:{}", unit.group_id, unit.in_group_seq));
            }
        }
        Ok(units)
    }
}

pub fn write_png(path: &Path) {
    let file = File::create(path).unwrap();
    let mut encoder = png::Encoder::new(BufWriter::new(file), 1, 1);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(&[0, 0, 0, 255]).unwrap();
}

/// How a scripted engine attempt goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Non-zero exit with stderr output.
    Exit,
    /// The engine ran past its deadline and was killed.
    Timeout,
    /// The engine binary could not be launched.
    Spawn,
    /// Exit 0, but the output is not a readable image.
    BadImage,
}

/// Fails a set number of times, then writes a 1x1 PNG.
pub struct ScriptedEngine {
    failures: usize,
    failure: Failure,
    write_garbage_on_failure: bool,
    calls: AtomicUsize,
    documents: Mutex<Vec<(PathBuf, String)>>,
}

impl ScriptedEngine {
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures,
            failure: Failure::Exit,
            write_garbage_on_failure: false,
            calls: AtomicUsize::new(0),
            documents: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    /// Leaves a truncated file at the output path on every failure.
    pub fn with_partial_output(mut self) -> Self {
        self.write_garbage_on_failure = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Temp document paths seen, with their contents at capture time.
    pub fn documents(&self) -> Vec<(PathBuf, String)> {
        self.documents.lock().unwrap().clone()
    }
}

impl RenderEngine for ScriptedEngine {
    fn capture(&self, document: &Path, output: &Path) -> Result<EngineRun, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let html = std::fs::read_to_string(document).unwrap_or_default();
        self.documents
            .lock()
            .unwrap()
            .push((document.to_path_buf(), html));

        if call >= self.failures {
            write_png(output);
            return Ok(EngineRun::default());
        }
        if self.write_garbage_on_failure {
            std::fs::write(output, b"\x89PN").unwrap();
        }
        match self.failure {
            Failure::Exit => Err(EngineError::Exit {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("crash #{}", call + 1),
            }),
            Failure::Timeout => Err(EngineError::Timeout(Duration::from_secs(60))),
            Failure::Spawn => Err(EngineError::Spawn {
                program: "chromium".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            }),
            Failure::BadImage => {
                std::fs::write(output, b"junk").unwrap();
                Ok(EngineRun::default())
            }
        }
    }
}

/// Progress store that reads as empty and refuses every write.
#[derive(Default)]
pub struct ReadOnlyProgressStore;

impl ProgressStore for ReadOnlyProgressStore {
    fn load(&self) -> anyhow::Result<ProgressSet> {
        Ok(ProgressSet::new())
    }

    fn save(&self, _progress: &ProgressSet) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

/// Fetcher returning canned words per key and counting calls.
#[derive(Default)]
pub struct CountingFetcher {
    words: HashMap<AnnotationKey, Vec<WordEntry>>,
    failing: Vec<AnnotationKey>,
    calls: Mutex<Vec<AnnotationKey>>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_words(mut self, key: AnnotationKey, words: &[&str]) -> Self {
        self.words
            .insert(key, words.iter().map(|w| WordEntry::new(*w)).collect());
        self
    }

    pub fn failing_for(mut self, key: AnnotationKey) -> Self {
        self.failing.push(key);
        self
    }

    pub fn calls(&self) -> Vec<AnnotationKey> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl AnnotationFetcher for CountingFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Static
    }

    fn url_for(&self, key: AnnotationKey) -> String {
        format!("https://example.test/{}/{}", key.group_id, key.in_group_seq)
    }

    fn fetch(&self, key: AnnotationKey) -> anyhow::Result<AnnotationRecord> {
        self.calls.lock().unwrap().push(key);
        if self.failing.contains(&key) {
            anyhow::bail!("connection reset");
        }
        let words = self.words.get(&key).cloned().unwrap_or_default();
        Ok(AnnotationRecord::new(key, self.url_for(key), FetchMethod::Static, words))
    }
}
