mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Failure, FakeCorpus, ReadOnlyProgressStore, ScriptedEngine, page, unit};
use murajaah::render::{RenderConfig, RenderError, RenderPipeline};
use murajaah::{MemoryProgressStore, PageNumber, ProgressStore, Variant};
use tempfile::TempDir;

struct Harness {
    _temp_dir: TempDir,
    engine: Arc<ScriptedEngine>,
    corpus: Arc<FakeCorpus>,
    progress: Arc<MemoryProgressStore>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    pipeline: RenderPipeline,
}

fn corpus() -> FakeCorpus {
    FakeCorpus::new()
        .with_page(
            page(5),
            vec![
                unit(2, "Al-Baqara", 25, "وَبَشِّرِ ٱلَّذِينَ"),
                unit(2, "Al-Baqara", 26, "إِنَّ ٱللَّهَ"),
            ],
        )
        .with_page(page(1), vec![unit(1, "Al-Faatiha", 1, "بِسْمِ ٱللَّهِ")])
}

fn harness(engine: ScriptedEngine, max_retries: usize, variant: Variant) -> Harness {
    harness_with_progress(engine, max_retries, variant, MemoryProgressStore::new())
}

fn harness_with_progress(
    engine: ScriptedEngine,
    max_retries: usize,
    variant: Variant,
    progress: MemoryProgressStore,
) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(engine);
    let corpus = Arc::new(corpus());
    let progress = Arc::new(progress);
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let recorded = sleeps.clone();

    let pipeline = RenderPipeline::new(
        corpus.clone(),
        engine.clone(),
        progress.clone(),
        RenderConfig {
            output_dir: temp_dir.path().join("pages"),
            variant,
            max_retries,
            backoff: Duration::from_secs(2),
        },
    )
    .with_sleeper(move |d| recorded.lock().unwrap().push(d));

    Harness {
        _temp_dir: temp_dir,
        engine,
        corpus,
        progress,
        sleeps,
        pipeline,
    }
}

#[test]
fn test_succeeds_on_third_attempt() {
    let h = harness(ScriptedEngine::failing_times(2), 3, Variant::Arabic);

    let artifact = h.pipeline.render(page(5)).unwrap();

    assert_eq!(artifact.page, page(5));
    assert!(artifact.path.exists());
    assert!(artifact.path.ends_with("quran_page_5_arabic.png"));
    assert_eq!(artifact.summary, "Al-Baqara");
    assert_eq!(h.engine.calls(), 3);
    assert_eq!(
        *h.sleeps.lock().unwrap(),
        vec![Duration::from_secs(2), Duration::from_secs(2)]
    );
    let progress = h.progress.load().unwrap();
    assert_eq!(progress.iter().collect::<Vec<_>>(), vec![page(5)]);
}

#[test]
fn test_always_failing_engine_makes_exactly_n_attempts() {
    for max_retries in [1, 3, 5] {
        let h = harness(ScriptedEngine::always_failing(), max_retries, Variant::Arabic);

        let err = h.pipeline.render(page(5)).unwrap_err();

        match err {
            RenderError::Exhausted { attempts, last } => {
                assert_eq!(attempts, max_retries);
                assert!(last.contains("status 1"), "last error was: {last}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.engine.calls(), max_retries);
        assert_eq!(h.sleeps.lock().unwrap().len(), max_retries - 1);
    }
}

#[test]
fn test_fails_n_minus_one_times_then_succeeds() {
    let h = harness(ScriptedEngine::failing_times(3), 4, Variant::Arabic);

    assert!(h.pipeline.render(page(5)).is_ok());
    assert_eq!(h.engine.calls(), 4);
    assert_eq!(h.progress.load().unwrap().len(), 1);
}

#[test]
fn test_exhaustion_leaves_no_artifact_and_no_progress() {
    let already = MemoryProgressStore::with_pages([page(1), page(2)]);
    let h = harness_with_progress(
        ScriptedEngine::always_failing().with_partial_output(),
        3,
        Variant::Arabic,
        already,
    );
    let before = h.progress.load().unwrap();

    assert!(h.pipeline.render(page(5)).is_err());

    assert!(!h.pipeline.artifact_path(page(5)).exists());
    assert_eq!(h.progress.load().unwrap(), before);
}

#[test]
fn test_fetch_failure_is_not_retried() {
    let h = harness(ScriptedEngine::failing_times(0), 3, Variant::Arabic);

    let err = h.pipeline.render(page(77)).unwrap_err();

    assert!(matches!(err, RenderError::Fetch(_)));
    assert_eq!(h.corpus.calls(), 1);
    assert_eq!(h.engine.calls(), 0);
    assert!(h.sleeps.lock().unwrap().is_empty());
    assert!(h.progress.load().unwrap().is_empty());
}

#[test]
fn test_temporary_documents_are_removed_on_every_path() {
    let h = harness(ScriptedEngine::failing_times(1), 3, Variant::Arabic);
    h.pipeline.render(page(5)).unwrap();

    let documents = h.engine.documents();
    assert_eq!(documents.len(), 2);
    for (path, html) in documents {
        assert!(!path.exists(), "{path:?} should have been cleaned up");
        assert!(html.contains("Page 5"));
        assert!(html.contains("وَبَشِّرِ ٱلَّذِينَ"));
    }
}

#[test]
fn test_rendering_twice_does_not_duplicate_progress() {
    let h = harness(ScriptedEngine::failing_times(0), 3, Variant::Arabic);

    let first = h.pipeline.render(page(1)).unwrap();
    let second = h.pipeline.render(page(1)).unwrap();

    assert_eq!(first.path, second.path);
    assert!(second.path.exists());
    let progress = h.progress.load().unwrap();
    assert_eq!(progress.len(), 1);
    assert!(progress.contains(PageNumber::FIRST));
}

#[test]
fn test_translation_variant() {
    let h = harness(ScriptedEngine::failing_times(0), 3, Variant::Translation);

    let artifact = h.pipeline.render(page(5)).unwrap();

    assert!(artifact.path.ends_with("quran_page_5_translation.png"));
    assert_eq!(artifact.variant, Variant::Translation);
    let (_, html) = &h.engine.documents()[0];
    assert!(html.contains("translation of 2:25"));
}

#[test]
fn test_zero_retries_still_attempts_once() {
    let h = harness(ScriptedEngine::always_failing(), 0, Variant::Arabic);
    assert!(h.pipeline.render(page(5)).is_err());
    assert_eq!(h.engine.calls(), 1);
    assert!(h.sleeps.lock().unwrap().is_empty());
}

#[test]
fn test_timeout_counts_as_failed_attempt() {
    let h = harness(
        ScriptedEngine::failing_times(2).with_failure(Failure::Timeout),
        3,
        Variant::Arabic,
    );

    assert!(h.pipeline.render(page(5)).is_ok());
    assert_eq!(h.engine.calls(), 3);
    assert_eq!(h.sleeps.lock().unwrap().len(), 2);
    assert!(h.progress.load().unwrap().contains(page(5)));
}

#[test]
fn test_spawn_failure_counts_as_failed_attempt() {
    let h = harness(
        ScriptedEngine::always_failing().with_failure(Failure::Spawn),
        3,
        Variant::Arabic,
    );

    match h.pipeline.render(page(5)).unwrap_err() {
        RenderError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(last.contains("chromium"), "last error was: {last}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.engine.calls(), 3);
    assert!(h.progress.load().unwrap().is_empty());
}

#[test]
fn test_unreadable_image_after_clean_exit_is_retried() {
    let h = harness(
        ScriptedEngine::failing_times(1).with_failure(Failure::BadImage),
        3,
        Variant::Arabic,
    );

    let artifact = h.pipeline.render(page(5)).unwrap();

    assert_eq!(h.engine.calls(), 2);
    assert_eq!(h.sleeps.lock().unwrap().len(), 1);
    assert_eq!(imagesize::size(&artifact.path).unwrap().width, 1);
    assert_eq!(h.progress.load().unwrap().len(), 1);
}

#[test]
fn test_unreadable_image_every_time_is_exhaustion() {
    let h = harness(
        ScriptedEngine::always_failing().with_failure(Failure::BadImage),
        2,
        Variant::Arabic,
    );

    assert!(matches!(
        h.pipeline.render(page(5)),
        Err(RenderError::Exhausted { attempts: 2, .. })
    ));
    assert!(!h.pipeline.artifact_path(page(5)).exists());
    assert!(h.progress.load().unwrap().is_empty());
}

#[test]
fn test_progress_write_failure_is_not_success() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::failing_times(0));
    let pipeline = RenderPipeline::new(
        Arc::new(corpus()),
        engine.clone(),
        Arc::new(ReadOnlyProgressStore),
        RenderConfig {
            output_dir: temp_dir.path().to_path_buf(),
            variant: Variant::Arabic,
            max_retries: 3,
            backoff: Duration::from_secs(2),
        },
    )
    .with_sleeper(|_| {});

    let err = pipeline.render(page(5)).unwrap_err();

    assert!(matches!(err, RenderError::Progress(_)));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(engine.calls(), 1);
}

#[test]
fn test_artifact_carries_first_verse() {
    let h = harness(ScriptedEngine::failing_times(0), 3, Variant::Arabic);
    let artifact = h.pipeline.render(page(5)).unwrap();
    assert_eq!(artifact.first_verse, Some((2, 25)));
}
