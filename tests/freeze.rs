//! Integration tests for the freeze pipeline.
//!
//! Ghostscript is replaced by [`FakeRasterizer`], which writes synthetic
//! JPEGs into the job's scratch directory (in scrambled order, the way a
//! directory listing may return them) and reuses the real page collector.
//! Outputs are checked by re-reading them with `lopdf`.
//!
//! Run with:
//!   cargo test --test freeze

use image::{ImageBuffer, Rgb};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use pdf_freezer::pipeline::rasterize::collect_pages;
use pdf_freezer::{
    CancelSignal, CompressionTier, FontSource, FreezeError, FreezeJob, FreezeProgressCallback,
    Freezer, FreezerApp, OverlayCorner, PageImage, ProcessOverrides, Rasterizer, SequenceManager,
    OverlayFont, TierSettings,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Behaviour {
    /// Write the configured pages.
    Pages,
    /// Exit "successfully" without writing anything.
    Nothing,
    /// Fail like a crashing engine.
    Crash,
    /// Block until the signal fires.
    Hang,
}

/// Stand-in engine that records where it was asked to write.
#[derive(Clone)]
struct FakeRasterizer {
    pages: Vec<(u32, u32)>,
    behaviour: Behaviour,
    seen: Arc<Mutex<Vec<(PathBuf, TierSettings)>>>,
}

impl FakeRasterizer {
    fn pages(pages: &[(u32, u32)]) -> Self {
        Self {
            pages: pages.to_vec(),
            behaviour: Behaviour::Pages,
            seen: Arc::default(),
        }
    }

    fn behaving(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            ..Self::pages(&[(40, 60)])
        }
    }

    fn last_workdir(&self) -> PathBuf {
        self.seen.lock().unwrap().last().unwrap().0.clone()
    }

    fn last_settings(&self) -> TierSettings {
        self.seen.lock().unwrap().last().unwrap().1
    }
}

impl Rasterizer for FakeRasterizer {
    async fn check(&self) -> Result<(), FreezeError> {
        Ok(())
    }

    async fn extract_pages(
        &self,
        _source: &Path,
        out_dir: &Path,
        settings: TierSettings,
        cancel: &CancelSignal,
    ) -> Result<Vec<PageImage>, FreezeError> {
        self.seen
            .lock()
            .unwrap()
            .push((out_dir.to_path_buf(), settings));

        match self.behaviour {
            Behaviour::Pages => {
                // Last page first so the collector has to sort.
                for (i, &(w, h)) in self.pages.iter().enumerate().rev() {
                    write_jpeg(&out_dir.join(format!("page-{}.jpg", i + 1)), w, h);
                }
                std::fs::write(out_dir.join("gs.log"), b"noise").unwrap();
                collect_pages(out_dir, settings.dpi)
            }
            Behaviour::Nothing => Ok(Vec::new()),
            Behaviour::Crash => Err(FreezeError::Rasterization {
                detail: "exit status 1".into(),
                output: "Error: /undefined in --file--".into(),
            }),
            Behaviour::Hang => {
                let reason = cancel.cancelled().await;
                Err(FreezeError::Cancelled {
                    reason: reason.to_string(),
                })
            }
        }
    }
}

/// Route library logs through the test harness (`RUST_LOG=debug` to see them).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_jpeg(path: &Path, w: u32, h: u32) {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 200]));
    img.save_with_format(path, image::ImageFormat::Jpeg)
        .unwrap();
}

/// A scratch area with an input file and a counter directory.
struct Sandbox {
    _dir: tempfile::TempDir,
    input: PathBuf,
    data: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("contract.pdf");
        std::fs::write(&input, b"%PDF-1.7 placeholder").unwrap();
        let data = dir.path().join("data");
        Self {
            input,
            data,
            _dir: dir,
        }
    }

    fn output(&self) -> PathBuf {
        self.input.with_file_name("contract_frozen.pdf")
    }

    fn counter(&self) -> Arc<SequenceManager> {
        Arc::new(SequenceManager::new(&self.data))
    }

    fn job(&self) -> FreezeJob {
        FreezeJob::builder(&self.input, self.output()).build().unwrap()
    }
}

fn page_content(doc: &Document, page: ObjectId) -> String {
    String::from_utf8_lossy(&doc.get_page_content(page).unwrap()).into_owned()
}

fn media_box(doc: &Document, page: ObjectId) -> Vec<f32> {
    doc.get_dictionary(page)
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_float().unwrap())
        .collect()
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_only_first_is_labelled() {
    let sb = Sandbox::new();
    let fake = FakeRasterizer::pages(&[(60, 80), (60, 80), (60, 80)]);
    let counter = sb.counter();
    let freezer = Freezer::with_parts(fake, Arc::clone(&counter));

    let report = assert_ok!(freezer.process(&sb.job(), &CancelSignal::new()).await);

    assert_eq!(report.serial, 1);
    assert_eq!(report.label, "AR0001");
    assert!(report.labelled);
    assert_eq!(report.pages, 3);
    assert_eq!(report.output, sb.output());
    assert_eq!(report.settings, CompressionTier::None.settings());
    assert_eq!(counter.current().unwrap(), 1, "counter advances exactly once");

    let doc = Document::load(sb.output()).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 3);
    assert!(page_content(&doc, pages[&1]).contains("(AR0001) Tj"));
    for n in [2, 3] {
        assert!(
            !page_content(&doc, pages[&n]).contains("Tj"),
            "page {n} must not carry a label"
        );
    }
}

#[tokio::test]
async fn serials_increase_across_jobs() {
    let sb = Sandbox::new();
    let counter = sb.counter();
    counter.set_override(41).unwrap();
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(30, 30)]), counter);

    let first = freezer.process(&sb.job(), &CancelSignal::new()).await.unwrap();
    let second = freezer.process(&sb.job(), &CancelSignal::new()).await.unwrap();

    assert_eq!(first.label, "AR0041");
    assert_eq!(second.label, "AR0042");
}

#[tokio::test]
async fn page_size_follows_pixels_and_dpi() {
    let sb = Sandbox::new();
    let fake = FakeRasterizer::pages(&[(850, 1100)]);
    let freezer = Freezer::with_parts(fake.clone(), sb.counter());
    let job = FreezeJob::builder(&sb.input, sb.output())
        .compression(CompressionTier::High)
        .build()
        .unwrap();

    freezer.process(&job, &CancelSignal::new()).await.unwrap();

    assert_eq!(fake.last_settings(), TierSettings { dpi: 100, quality: 65 });
    let doc = Document::load(sb.output()).unwrap();
    let pages = doc.get_pages();
    assert_eq!(media_box(&doc, pages[&1]), vec![0.0, 0.0, 612.0, 792.0]);
}

#[tokio::test]
async fn empty_document_writes_nothing() {
    let sb = Sandbox::new();
    let counter = sb.counter();
    let freezer =
        Freezer::with_parts(FakeRasterizer::behaving(Behaviour::Nothing), Arc::clone(&counter));

    let err = assert_err!(freezer.process(&sb.job(), &CancelSignal::new()).await);

    assert!(matches!(err, FreezeError::EmptyDocument { .. }), "got {err:?}");
    assert!(!sb.output().exists());
    assert_eq!(counter.current().unwrap(), 1, "serial stays consumed");
}

#[tokio::test]
async fn failed_job_leaves_gap_in_sequence() {
    let sb = Sandbox::new();
    let counter = sb.counter();
    let broken =
        Freezer::with_parts(FakeRasterizer::behaving(Behaviour::Crash), Arc::clone(&counter));

    let err = assert_err!(broken.process(&sb.job(), &CancelSignal::new()).await);
    assert!(err.is_rasterization());
    assert!(err.to_string().contains("exit status 1"));
    assert!(!sb.output().exists());

    let working = Freezer::with_parts(FakeRasterizer::pages(&[(20, 20)]), counter);
    let report = working.process(&sb.job(), &CancelSignal::new()).await.unwrap();
    assert_eq!(report.serial, 2);
}

#[tokio::test]
async fn scratch_directory_removed_after_success_and_failure() {
    let sb = Sandbox::new();

    let ok = FakeRasterizer::pages(&[(20, 20), (20, 20)]);
    Freezer::with_parts(ok.clone(), sb.counter())
        .process(&sb.job(), &CancelSignal::new())
        .await
        .unwrap();
    assert!(!ok.last_workdir().exists());

    let crash = FakeRasterizer::behaving(Behaviour::Crash);
    let _ = Freezer::with_parts(crash.clone(), sb.counter())
        .process(&sb.job(), &CancelSignal::new())
        .await;
    assert!(!crash.last_workdir().exists());
}

#[tokio::test]
async fn unreadable_font_fails_only_labelled_jobs() {
    let sb = Sandbox::new();
    let missing = sb.input.with_file_name("no-such-font.ttf");
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(20, 20)]), sb.counter())
        .with_font(FontSource::File(missing));

    let err = assert_err!(freezer.process(&sb.job(), &CancelSignal::new()).await);
    assert!(matches!(err, FreezeError::Font { .. }), "got {err:?}");
    assert!(!sb.output().exists());

    let unlabelled = FreezeJob::builder(&sb.input, sb.output())
        .overlay(false)
        .build()
        .unwrap();
    let report = assert_ok!(freezer.process(&unlabelled, &CancelSignal::new()).await);
    assert!(!report.labelled);
    assert_eq!(report.label, "AR0002", "label is still reported");

    let doc = Document::load(sb.output()).unwrap();
    let pages = doc.get_pages();
    assert!(!page_content(&doc, pages[&1]).contains("Tj"));
}

#[tokio::test]
async fn overwrite_replaces_input() {
    let sb = Sandbox::new();
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(20, 30), (20, 30)]), sb.counter());
    let job = FreezeJob::builder(&sb.input, &sb.input).build().unwrap();

    freezer.process(&job, &CancelSignal::new()).await.unwrap();

    let doc = Document::load(&sb.input).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
    assert!(!sb.output().exists());
}

#[tokio::test]
async fn label_corner_is_respected() {
    let sb = Sandbox::new();
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(850, 1100)]), sb.counter());
    let job = FreezeJob::builder(&sb.input, sb.output())
        .compression(CompressionTier::High)
        .corner(OverlayCorner::TopLeft)
        .prefix("INV")
        .build()
        .unwrap();

    freezer.process(&job, &CancelSignal::new()).await.unwrap();

    let doc = Document::load(sb.output()).unwrap();
    let content = page_content(&doc, doc.get_pages()[&1]);
    assert!(content.contains("(INV0001) Tj"));
    // Courier at 12pt: x = margin, y = height - margin - ascent.
    let ops = Content::decode(&doc.get_page_content(doc.get_pages()[&1]).unwrap())
        .unwrap()
        .operations;
    let td = ops.iter().find(|op| op.operator == "Td").unwrap();
    let x = td.operands[0].as_float().unwrap();
    let y = td.operands[1].as_float().unwrap();
    assert!((x - 1.0).abs() < 0.01, "x = {x}");
    assert!((y - (792.0 - 1.0 - 12.0 * 0.629)).abs() < 0.01, "y = {y}");
}

const FIXTURE_FONT: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSansMono.ttf");

fn temp_fonts() -> BTreeSet<PathBuf> {
    std::fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("pdf-freezer-font-"))
        })
        .collect()
}

/// Notes which temporary font files exist while pages are being added.
#[derive(Default)]
struct TempFontWatcher {
    seen: Mutex<BTreeSet<PathBuf>>,
}

impl FreezeProgressCallback for TempFontWatcher {
    fn on_page_added(&self, _page_num: usize, _total_pages: usize) {
        self.seen.lock().unwrap().extend(temp_fonts());
    }
}

#[tokio::test]
async fn in_memory_font_is_embedded_and_removed() {
    let sb = Sandbox::new();
    let bytes = std::fs::read(FIXTURE_FONT).unwrap();
    let expected_width = OverlayFont::from_truetype(bytes.clone())
        .unwrap()
        .text_width("AR0001", 12.0);
    let before = temp_fonts();
    let watcher = Arc::new(TempFontWatcher::default());
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(850, 1100)]), sb.counter())
        .with_font(FontSource::Bytes(Arc::new(bytes)))
        .with_progress(Arc::clone(&watcher) as Arc<dyn FreezeProgressCallback>);
    let job = FreezeJob::builder(&sb.input, sb.output())
        .compression(CompressionTier::High)
        .corner(OverlayCorner::BottomRight)
        .build()
        .unwrap();

    assert_ok!(freezer.process(&job, &CancelSignal::new()).await);

    let doc = Document::load(sb.output()).unwrap();
    let page = doc.get_pages()[&1];
    assert!(page_content(&doc, page).contains("(AR0001) Tj"));
    let font_id = doc
        .get_dictionary(page)
        .unwrap()
        .get(b"Resources")
        .and_then(Object::as_dict)
        .unwrap()
        .get(b"Font")
        .and_then(Object::as_dict)
        .unwrap()
        .get(b"F1")
        .and_then(Object::as_reference)
        .unwrap();
    let font = doc.get_dictionary(font_id).unwrap();
    assert_eq!(font.get(b"Subtype").unwrap().as_name().unwrap(), b"TrueType");
    assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"DejaVuSansMono");

    // Bottom right: x = width - text width - margin.
    let ops = Content::decode(&doc.get_page_content(page).unwrap())
        .unwrap()
        .operations;
    let td = ops.iter().find(|op| op.operator == "Td").unwrap();
    let x = td.operands[0].as_float().unwrap();
    assert!((x - (612.0 - expected_width - 1.0)).abs() < 0.01, "x = {x}");

    let during: BTreeSet<PathBuf> = watcher
        .seen
        .lock()
        .unwrap()
        .difference(&before)
        .cloned()
        .collect();
    assert!(!during.is_empty(), "font must be on disk while pages are added");
    for path in &during {
        assert!(!path.exists(), "{} left behind", path.display());
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn timeout_aborts_rasterisation() {
    let sb = Sandbox::new();
    let freezer = Freezer::with_parts(FakeRasterizer::behaving(Behaviour::Hang), sb.counter());
    let job = FreezeJob::builder(&sb.input, sb.output())
        .rasterize_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let caller = CancelSignal::new();

    let err = assert_err!(freezer.process(&job, &caller).await);

    assert!(matches!(err, FreezeError::Cancelled { .. }), "got {err:?}");
    assert!(err.to_string().contains("timed out"));
    assert!(!caller.is_cancelled(), "timeout must not cancel the caller");
    assert!(!sb.output().exists());
}

#[tokio::test]
async fn caller_abort_stops_job() {
    let sb = Sandbox::new();
    let freezer = Freezer::with_parts(FakeRasterizer::behaving(Behaviour::Hang), sb.counter());
    let cancel = CancelSignal::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = assert_err!(freezer.process(&sb.job(), &cancel).await);
    assert!(err.is_rasterization());
    assert!(err.to_string().contains("cancelled by caller"));
}

#[tokio::test]
async fn unbounded_timeout_still_honours_caller_abort() {
    let sb = Sandbox::new();
    let freezer = Freezer::with_parts(FakeRasterizer::behaving(Behaviour::Hang), sb.counter());
    let job = FreezeJob::builder(&sb.input, sb.output())
        .rasterize_timeout(Duration::MAX)
        .build()
        .unwrap();
    let cancel = CancelSignal::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = assert_err!(freezer.process(&job, &cancel).await);
    assert!(matches!(err, FreezeError::Cancelled { .. }), "got {err:?}");
    assert!(err.to_string().contains("cancelled by caller"));
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, e: String) {
        self.events.lock().unwrap().push(e);
    }
}

impl FreezeProgressCallback for Recorder {
    fn on_job_start(&self, _input: &Path) {
        self.push("start".into());
    }
    fn on_serial_issued(&self, number: u64, label: &str) {
        self.push(format!("serial {number} {label}"));
    }
    fn on_pages_rasterized(&self, total_pages: usize) {
        self.push(format!("rasterized {total_pages}"));
    }
    fn on_page_added(&self, page_num: usize, total_pages: usize) {
        self.push(format!("page {page_num}/{total_pages}"));
    }
    fn on_job_complete(&self, _output: &Path, total_pages: usize) {
        self.push(format!("complete {total_pages}"));
    }
}

#[tokio::test]
async fn progress_events_arrive_in_order() {
    let sb = Sandbox::new();
    let recorder = Arc::new(Recorder::default());
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(20, 20), (20, 20)]), sb.counter())
        .with_progress(Arc::clone(&recorder) as Arc<dyn FreezeProgressCallback>);

    freezer.process(&sb.job(), &CancelSignal::new()).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start",
            "serial 1 AR0001",
            "rasterized 2",
            "page 1/2",
            "page 2/2",
            "complete 2",
        ]
    );
}

#[tokio::test]
async fn progress_stops_at_failing_step() {
    let sb = Sandbox::new();
    let recorder = Arc::new(Recorder::default());
    let freezer = Freezer::with_parts(FakeRasterizer::behaving(Behaviour::Nothing), sb.counter())
        .with_progress(Arc::clone(&recorder) as Arc<dyn FreezeProgressCallback>);

    let _ = freezer.process(&sb.job(), &CancelSignal::new()).await;

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events, vec!["start", "serial 1 AR0001"]);
}

// ── Application facade ───────────────────────────────────────────────────────

#[tokio::test]
async fn app_process_file_applies_overrides() {
    let sb = Sandbox::new();
    let fake = FakeRasterizer::pages(&[(850, 1100), (850, 1100)]);
    let app = FreezerApp::with_rasterizer(&sb.data, fake.clone());
    app.set_prefix("DOC").unwrap();

    let overrides = ProcessOverrides {
        prefix: Some("INV".into()),
        position: Some("top-right".into()),
        compression: Some("high".into()),
        suffix: Some("_locked".into()),
        ..Default::default()
    };
    let report = assert_ok!(app.process_file(&sb.input, &overrides, &CancelSignal::new()).await);

    assert_eq!(report.label, "INV0001");
    assert_eq!(report.output, sb.input.with_file_name("contract_locked.pdf"));
    assert_eq!(fake.last_settings().dpi, 100);
    assert_eq!(app.current_number().unwrap(), 2);
    assert!(report.output.exists());
}

#[tokio::test]
async fn app_uses_saved_settings() {
    let sb = Sandbox::new();
    let app = FreezerApp::with_rasterizer(&sb.data, FakeRasterizer::pages(&[(20, 20)]));
    app.set_prefix("DOC").unwrap();
    app.set_file_suffix("_v").unwrap();
    app.set_number_override(7).unwrap();

    let report = app
        .process_file(&sb.input, &ProcessOverrides::default(), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(report.label, "DOC0007");
    assert_eq!(report.output, sb.input.with_file_name("contract_v.pdf"));
}

#[tokio::test]
async fn app_overwrite_setting_targets_input() {
    let sb = Sandbox::new();
    let app = FreezerApp::with_rasterizer(&sb.data, FakeRasterizer::pages(&[(20, 20)]));
    app.set_overwrite_mode(true).unwrap();

    let report = app
        .process_file(&sb.input, &ProcessOverrides::default(), &CancelSignal::new())
        .await
        .unwrap();

    assert_eq!(report.output, sb.input);
    assert!(Document::load(&sb.input).is_ok());
}

#[tokio::test]
async fn app_empty_path_rejected_without_serial() {
    let sb = Sandbox::new();
    let app = FreezerApp::with_rasterizer(&sb.data, FakeRasterizer::pages(&[(20, 20)]));

    let err = assert_err!(
        app.process_file(Path::new(""), &ProcessOverrides::default(), &CancelSignal::new())
            .await
    );

    assert!(matches!(err, FreezeError::InvalidInput(_)));
    assert_eq!(app.current_number().unwrap(), 1);
}

// ── Object check ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn pages_are_single_images() {
    let sb = Sandbox::new();
    let freezer = Freezer::with_parts(FakeRasterizer::pages(&[(32, 48)]), sb.counter());
    let job = FreezeJob::builder(&sb.input, sb.output())
        .overlay(false)
        .build()
        .unwrap();

    freezer.process(&job, &CancelSignal::new()).await.unwrap();

    let doc = Document::load(sb.output()).unwrap();
    let images: Vec<_> = doc
        .objects
        .values()
        .filter_map(|o| match o {
            Object::Stream(s) => Some(s),
            _ => None,
        })
        .filter(|s| {
            s.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Image".as_slice())
        })
        .collect();
    assert_eq!(images.len(), 1);
    let filter = images[0].dict.get(b"Filter").unwrap().as_name().unwrap();
    assert_eq!(filter, b"DCTDecode");
}
