use crate::render::{Annotation, encode_jpeg};
use crate::settings::DetectionSettings;
use crate::worker::WorkerDeps;
use bus::{keys, publish};
use capture::{CaptureError, FrameSource, SourceKind};
use common::{Backoff, sleep_unless_stopped};
use futures::Stream;
use image::RgbImage;
use inference::ModelCache;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Camera id under which the preview feed is mirrored on the bus.
pub const PREVIEW_ID: &str = "preview";

/// Push cadence for streaming consumers (about 20 frames per second).
pub const STREAM_INTERVAL: Duration = Duration::from_millis(50);

const IDLE_RETRY: Duration = Duration::from_secs(1);

const MSG_NO_SIGNAL: &str = "No signal";
const MSG_NOT_CONFIGURED: &str = "Source not configured";
const MSG_WAITING: &str = "Waiting for source";
const MSG_DETECTION_DOWN: &str = "Detection unavailable";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

struct LoopHandle {
    stop: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    viewers: usize,
    running: Option<LoopHandle>,
}

struct Shared {
    deps: WorkerDeps,
    demo_dir: PathBuf,
    backoff: Backoff,
    settings: Mutex<DetectionSettings>,
    settings_epoch: AtomicU64,
    model_epoch: AtomicU64,
    latest: Mutex<Arc<Vec<u8>>>,
    state: Mutex<State>,
    loop_active: AtomicBool,
    run_lock: Arc<Mutex<()>>,
}

/// Single shared live preview, running only while someone watches.
///
/// The first viewer starts the capture loop, the last one leaving stops it.
/// Viewers always receive a frame: the last captured one or a placeholder.
#[derive(Clone)]
pub struct StreamManager {
    shared: Arc<Shared>,
}

impl StreamManager {
    pub fn new(
        deps: WorkerDeps,
        settings: DetectionSettings,
        demo_dir: impl Into<PathBuf>,
        backoff: Backoff,
    ) -> Self {
        let placeholder = deps.annotator.placeholder_jpeg(MSG_NO_SIGNAL);
        Self {
            shared: Arc::new(Shared {
                deps,
                demo_dir: demo_dir.into(),
                backoff,
                settings: Mutex::new(settings),
                settings_epoch: AtomicU64::new(0),
                model_epoch: AtomicU64::new(0),
                latest: Mutex::new(Arc::new(placeholder)),
                state: Mutex::new(State::default()),
                loop_active: AtomicBool::new(false),
                run_lock: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Registers a viewer; the first one starts the loop. Returns the new count.
    pub fn attach(&self) -> usize {
        self.shared.attach()
    }

    /// Unregisters a viewer; the last one signals the loop to stop without
    /// waiting for it. Returns the new count.
    pub fn detach(&self) -> usize {
        self.shared.detach()
    }

    /// RAII viewer registration.
    pub fn viewer(&self) -> ViewerGuard {
        ViewerGuard::new(Arc::clone(&self.shared))
    }

    pub fn viewers(&self) -> usize {
        lock(&self.shared.state).viewers
    }

    /// Whether a capture loop is currently executing.
    pub fn is_running(&self) -> bool {
        self.shared.loop_active.load(Ordering::SeqCst)
    }

    pub fn get_latest_frame(&self) -> Vec<u8> {
        self.shared.latest().to_vec()
    }

    pub fn settings(&self) -> DetectionSettings {
        lock(&self.shared.settings).clone()
    }

    /// Replaces the preview configuration; a running loop reopens its source.
    pub fn update_settings(&self, settings: DetectionSettings) {
        tracing::info!(
            source_type = ?settings.source_type,
            target = %settings.detection_target,
            "Preview settings updated"
        );
        *lock(&self.shared.settings) = settings;
        self.shared.settings_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Switches the model; the cached detector is dropped and reloaded on the
    /// next inference cycle.
    pub fn update_model(&self, model: &str) {
        tracing::info!(model, "Preview model updated");
        lock(&self.shared.settings).detection_model = model.to_string();
        self.shared.model_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Frames at [`STREAM_INTERVAL`] for as long as the consumer keeps polling.
    /// The consumer counts as a viewer from the first poll until the stream is dropped.
    pub fn stream(&self) -> impl Stream<Item = Vec<u8>> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        async_stream::stream! {
            let _viewer = ViewerGuard::new(Arc::clone(&shared));
            let mut ticker = tokio::time::interval(STREAM_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                yield shared.latest().to_vec();
            }
        }
    }

    /// Stops the loop regardless of viewers.
    pub fn shutdown(&self) {
        let mut state = lock(&self.shared.state);
        if let Some(handle) = state.running.take() {
            handle.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl Shared {
    fn latest(&self) -> Arc<Vec<u8>> {
        Arc::clone(&lock(&self.latest))
    }

    fn set_latest(&self, jpeg: Vec<u8>) {
        publish(
            self.deps.bus.as_ref(),
            &keys::processed_frame(PREVIEW_ID),
            jpeg.clone(),
        );
        *lock(&self.latest) = Arc::new(jpeg);
    }

    fn show_placeholder(&self, message: &str) {
        self.set_latest(self.deps.annotator.placeholder_jpeg(message));
    }

    fn settings(&self) -> DetectionSettings {
        lock(&self.settings).clone()
    }

    fn attach(self: &Arc<Self>) -> usize {
        let mut state = lock(&self.state);
        state.viewers += 1;
        if state.viewers == 1 {
            self.start_loop(&mut state);
        }
        tracing::debug!(viewers = state.viewers, "Viewer attached");
        state.viewers
    }

    fn detach(&self) -> usize {
        let mut state = lock(&self.state);
        if state.viewers == 0 {
            tracing::warn!("Detach without matching attach");
            return 0;
        }
        state.viewers -= 1;
        if state.viewers == 0
            && let Some(handle) = state.running.take()
        {
            handle.stop.store(true, Ordering::SeqCst);
            tracing::info!("Last viewer left, stopping preview loop");
        }
        tracing::debug!(viewers = state.viewers, "Viewer detached");
        state.viewers
    }

    fn start_loop(self: &Arc<Self>, state: &mut State) {
        if let Some(previous) = state.running.take() {
            previous.stop.store(true, Ordering::SeqCst);
        }
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(self);
        let stop_flag = Arc::clone(&stop);
        match thread::Builder::new()
            .name("preview".into())
            .spawn(move || preview_loop(shared, stop_flag))
        {
            Ok(thread) => {
                tracing::info!("Preview loop starting");
                state.running = Some(LoopHandle {
                    stop,
                    _thread: thread,
                });
            }
            Err(e) => tracing::error!(error = %e, "Failed to spawn preview loop"),
        }
    }

    fn publish_frame(&self, frame: &RgbImage, settings: &DetectionSettings, models: &mut ModelCache, failing: &mut bool) {
        let bus = self.deps.bus.as_ref();
        let raw = match encode_jpeg(frame) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode preview frame");
                return;
            }
        };
        publish(bus, &keys::stream_frame(PREVIEW_ID), raw.clone());

        let classes = settings.target().classes();
        if classes.is_empty() {
            self.set_latest(raw);
            return;
        }

        let detected = models
            .get(&settings.detection_model)
            .and_then(|detector| detector.detect(frame, classes));
        match detected {
            Ok(objects) => {
                *failing = false;
                let mut annotated = frame.clone();
                let annotations: Vec<Annotation<'_>> = objects
                    .iter()
                    .map(|object| Annotation {
                        object,
                        inside: None,
                    })
                    .collect();
                self.deps.annotator.annotate(&mut annotated, &annotations, None);
                match encode_jpeg(&annotated) {
                    Ok(jpeg) => self.set_latest(jpeg),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode annotated preview");
                        self.set_latest(raw);
                    }
                }
            }
            Err(e) => {
                if !*failing {
                    tracing::warn!(error = %e, model = %settings.detection_model, "Preview detection failed");
                    *failing = true;
                }
                self.show_placeholder(MSG_DETECTION_DOWN);
            }
        }
    }
}

fn release(source: &mut Option<Box<dyn FrameSource>>) {
    if let Some(mut s) = source.take() {
        s.release();
    }
}

fn preview_loop(shared: Arc<Shared>, stop: Arc<AtomicBool>) {
    let _running = lock(&shared.run_lock);
    shared.loop_active.store(true, Ordering::SeqCst);
    tracing::info!("Preview loop started");

    let mut source: Option<Box<dyn FrameSource>> = None;
    let mut models = ModelCache::new(Arc::clone(&shared.deps.detectors));
    let mut settings_epoch = shared.settings_epoch.load(Ordering::SeqCst);
    let mut model_epoch = shared.model_epoch.load(Ordering::SeqCst);
    let mut failures = 0u32;
    let mut detection_failing = false;

    while !stop.load(Ordering::SeqCst) {
        let epoch = shared.settings_epoch.load(Ordering::SeqCst);
        if epoch != settings_epoch {
            settings_epoch = epoch;
            release(&mut source);
        }
        let epoch = shared.model_epoch.load(Ordering::SeqCst);
        if epoch != model_epoch {
            model_epoch = epoch;
            models.invalidate();
        }
        let settings = shared.settings();

        if source.is_none() {
            let Some(spec) = settings.preview_source(&shared.demo_dir) else {
                shared.show_placeholder(MSG_NOT_CONFIGURED);
                sleep_unless_stopped(IDLE_RETRY, &stop);
                continue;
            };
            match shared.deps.opener.open(&spec) {
                Ok(opened) => source = Some(opened),
                Err(e) => {
                    tracing::warn!(source = %spec, error = %e, "Preview source unavailable");
                    shared.show_placeholder(MSG_WAITING);
                    sleep_unless_stopped(shared.backoff.delay_for_attempt(failures).max(IDLE_RETRY), &stop);
                    failures = failures.saturating_add(1);
                    continue;
                }
            }
        }
        let Some(active) = source.as_mut() else {
            continue;
        };

        match active.read() {
            Ok(frame) => {
                failures = 0;
                shared.publish_frame(&frame, &settings, &mut models, &mut detection_failing);
            }
            Err(CaptureError::EndOfStream) if active.kind() == SourceKind::File => {
                if let Err(e) = active.rewind() {
                    tracing::warn!(error = %e, "Preview rewind failed");
                    release(&mut source);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Preview read failed");
                release(&mut source);
                shared.show_placeholder(MSG_WAITING);
                sleep_unless_stopped(shared.backoff.delay_for_attempt(failures), &stop);
                failures = failures.saturating_add(1);
            }
        }
    }

    release(&mut source);
    shared.loop_active.store(false, Ordering::SeqCst);
    tracing::info!("Preview loop stopped");
}

/// Counts as one viewer until dropped.
pub struct ViewerGuard {
    shared: Arc<Shared>,
}

impl ViewerGuard {
    fn new(shared: Arc<Shared>) -> Self {
        shared.attach();
        Self { shared }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.shared.detach();
    }
}
