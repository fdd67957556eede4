//! Scripted collaborators for driving capture loops without cameras or models.
#![allow(dead_code)]

use bus::{BusError, FrameBus, MemoryBus};
use capture::{CaptureError, Frame, FrameSource, Interrupt, SourceKind, SourceOpener, SourceSpec};
use common::Backoff;
use inference::{BoundingBox, Detector, DetectorFactory, TrackedObject};
use pipeline::{Annotator, PipelineMetrics, SnapshotStore, WorkerDeps};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Frame whose first pixel carries its position in the source.
pub fn numbered_frame(index: usize) -> Frame {
    let mut frame = Frame::from_pixel(WIDTH, HEIGHT, image::Rgb([40, 40, 40]));
    frame.put_pixel(0, 0, image::Rgb([index as u8, 0, 0]));
    frame
}

pub fn fast_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(1), Duration::from_millis(5))
}

// ========== Bus ==========

/// Memory bus that counts writes and deletes per key, and keeps every
/// value written to a `*_flag` key.
#[derive(Default)]
pub struct CountingBus {
    inner: MemoryBus,
    sets: Mutex<HashMap<String, usize>>,
    deletes: Mutex<HashMap<String, usize>>,
    flags: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl CountingBus {
    pub fn flag_history(&self, key: &str) -> Vec<Vec<u8>> {
        self.flags.lock().unwrap().get(key).cloned().unwrap_or_default()
    }

    pub fn sets(&self, key: &str) -> usize {
        self.sets.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn deletes(&self, key: &str) -> usize {
        self.deletes.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).unwrap()
    }
}

impl FrameBus for CountingBus {
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BusError> {
        *self.sets.lock().unwrap().entry(key.to_string()).or_default() += 1;
        if key.ends_with("_flag") {
            self.flags.lock().unwrap().entry(key.to_string()).or_default().push(value.clone());
        }
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BusError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<(), BusError> {
        *self.deletes.lock().unwrap().entry(key.to_string()).or_default() += 1;
        self.inner.delete(key)
    }
}

/// Bus whose every operation fails, like an unreachable store.
#[derive(Default)]
pub struct FailingBus {
    pub attempts: AtomicUsize,
}

impl FailingBus {
    fn refuse(&self) -> BusError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        BusError::Unavailable("connection refused".into())
    }
}

impl FrameBus for FailingBus {
    fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), BusError> {
        Err(self.refuse())
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BusError> {
        Err(self.refuse())
    }

    fn delete(&self, _key: &str) -> Result<(), BusError> {
        Err(self.refuse())
    }
}

// ========== Sources ==========

/// Counters shared by every source a [`ScriptedOpener`] hands out.
#[derive(Default)]
pub struct SourceStats {
    pub opens: AtomicUsize,
    pub rewinds: AtomicUsize,
    pub reopens: AtomicUsize,
    pub reads: AtomicUsize,
    pub reading: AtomicUsize,
    pub max_concurrent_reads: AtomicUsize,
    pub fail_next_read: AtomicBool,
}

/// Longest a stalled read waits for its interrupt before giving up.
const STALL_LIMIT: Duration = Duration::from_secs(10);

pub struct ScriptedSource {
    kind: SourceKind,
    length: Option<usize>,
    position: usize,
    open: bool,
    read_delay: Duration,
    stall: bool,
    interrupted: Arc<AtomicBool>,
    stats: Arc<SourceStats>,
}

impl ScriptedSource {
    /// Blocks like a camera that stopped sending, until interrupted.
    fn wait_for_interrupt(&self) -> Result<Frame, CaptureError> {
        let deadline = Instant::now() + STALL_LIMIT;
        while !self.interrupted.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        Err(CaptureError::Read("stream closed".into()))
    }

    fn advance(&mut self) -> Result<usize, CaptureError> {
        if !self.open {
            return Err(CaptureError::Released);
        }
        if self.stats.fail_next_read.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::Read("scripted failure".into()));
        }
        if self.length.is_some_and(|len| self.position >= len) {
            return Err(CaptureError::EndOfStream);
        }
        let index = self.position;
        self.position += 1;
        Ok(index)
    }
}

impl FrameSource for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn describe(&self) -> String {
        "scripted".into()
    }

    fn grab(&mut self) -> Result<(), CaptureError> {
        self.advance().map(|_| ())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let stats = Arc::clone(&self.stats);
        let now = stats.reading.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_concurrent_reads.fetch_max(now, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        let result = if self.stall {
            self.wait_for_interrupt()
        } else {
            self.advance().map(numbered_frame)
        };
        stats.reading.fetch_sub(1, Ordering::SeqCst);
        stats.reads.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn rewind(&mut self) -> Result<(), CaptureError> {
        self.stats.rewinds.fetch_add(1, Ordering::SeqCst);
        self.position = 0;
        Ok(())
    }

    fn reopen(&mut self) -> Result<(), CaptureError> {
        self.stats.reopens.fetch_add(1, Ordering::SeqCst);
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(CaptureError::open("scripted", "source interrupted"));
        }
        self.open = true;
        Ok(())
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn interrupt(&self) -> Interrupt {
        if !self.stall {
            return Interrupt::noop();
        }
        let interrupted = Arc::clone(&self.interrupted);
        Interrupt::new(move || interrupted.store(true, Ordering::SeqCst))
    }
}

pub struct ScriptedOpener {
    pub kind: SourceKind,
    pub length: Option<usize>,
    pub read_delay: Duration,
    pub stall_reads: bool,
    pub fail_open: AtomicBool,
    pub stats: Arc<SourceStats>,
    pub opened: Mutex<Vec<SourceSpec>>,
}

impl ScriptedOpener {
    pub fn file(length: usize) -> Self {
        Self::new(SourceKind::File, Some(length))
    }

    pub fn live() -> Self {
        Self::new(SourceKind::Live, None)
    }

    fn new(kind: SourceKind, length: Option<usize>) -> Self {
        Self {
            kind,
            length,
            read_delay: Duration::ZERO,
            stall_reads: false,
            fail_open: AtomicBool::new(false),
            stats: Arc::new(SourceStats::default()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Reads block until the worker's interrupt fires.
    pub fn with_stalled_reads(mut self) -> Self {
        self.stall_reads = true;
        self
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, CaptureError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::open(spec.to_string(), "scripted open failure"));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().unwrap().push(spec.clone());
        Ok(Box::new(ScriptedSource {
            kind: self.kind,
            length: self.length,
            position: 0,
            open: true,
            read_delay: self.read_delay,
            stall: self.stall_reads,
            interrupted: Arc::default(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

// ========== Detectors ==========

/// Shared switches and observations for every detector the factory loads.
#[derive(Default)]
pub struct DetectorScript {
    /// Report one car covering the frame centre.
    pub present: AtomicBool,
    pub fail: AtomicBool,
    pub seen: Mutex<Vec<u8>>,
    pub loads: Mutex<Vec<String>>,
}

struct ScriptedDetector {
    script: Arc<DetectorScript>,
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, frame: &image::RgbImage, _classes: &[u16]) -> anyhow::Result<Vec<TrackedObject>> {
        self.script.seen.lock().unwrap().push(frame.get_pixel(0, 0)[0]);
        if self.script.fail.load(Ordering::SeqCst) {
            anyhow::bail!("scripted inference failure");
        }
        if !self.script.present.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![TrackedObject {
            track_id: Some(1),
            bbox: BoundingBox::new(16.0, 12.0, 48.0, 36.0),
            class_id: 2,
            confidence: 0.9,
        }])
    }
}

pub struct ScriptedFactory {
    pub script: Arc<DetectorScript>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            script: Arc::new(DetectorScript::default()),
        }
    }
}

impl DetectorFactory for ScriptedFactory {
    fn load(&self, model: &str) -> anyhow::Result<Box<dyn Detector>> {
        self.script.loads.lock().unwrap().push(model.to_string());
        Ok(Box::new(ScriptedDetector {
            script: Arc::clone(&self.script),
        }))
    }
}

// ========== Snapshots ==========

#[derive(Default)]
pub struct RecordingSnapshots {
    pub saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl SnapshotStore for RecordingSnapshots {
    fn save(&self, camera_id: &str, jpeg: &[u8]) -> anyhow::Result<PathBuf> {
        let mut saved = self.saved.lock().unwrap();
        saved.push((camera_id.to_string(), jpeg.to_vec()));
        Ok(PathBuf::from(format!("vehicle_{camera_id}_{}.jpg", saved.len())))
    }
}

// ========== Wiring ==========

pub struct Harness {
    pub bus: Arc<CountingBus>,
    pub opener: Arc<ScriptedOpener>,
    pub factory: Arc<ScriptedFactory>,
    pub snapshots: Arc<RecordingSnapshots>,
}

impl Harness {
    pub fn new(opener: ScriptedOpener) -> Self {
        Self {
            bus: Arc::new(CountingBus::default()),
            opener: Arc::new(opener),
            factory: Arc::new(ScriptedFactory::new()),
            snapshots: Arc::new(RecordingSnapshots::default()),
        }
    }

    pub fn deps(&self) -> WorkerDeps {
        WorkerDeps {
            bus: self.bus.clone(),
            opener: self.opener.clone(),
            detectors: self.factory.clone(),
            annotator: Arc::new(Annotator::without_font().unwrap()),
            snapshots: self.snapshots.clone(),
            metrics: PipelineMetrics::new("pipeline-tests"),
        }
    }

    pub fn script(&self) -> &DetectorScript {
        &self.factory.script
    }
}
