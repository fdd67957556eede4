use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::region::{Edge, Point, Region, RegionTracker};
use crate::render::{Annotation, Annotator, encode_jpeg};
use crate::snapshot::SnapshotStore;
use bus::{SharedBus, clear, keys, publish};
use capture::{CaptureError, FrameAdmission, FrameSource, Interrupt, SourceKind, SourceOpener, SourceSpec};
use common::{Backoff, sleep_unless_stopped};
use image::{RgbImage, imageops};
use inference::{DetectorFactory, ModelCache, TrackedObject};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Latest crops kept on the bus per camera; older track keys are deleted.
pub const CROP_CACHE_LIMIT: usize = 64;

const STATUS_INTERVAL: u64 = 30;

/// Collaborators shared by every capture loop.
#[derive(Clone)]
pub struct WorkerDeps {
    pub bus: SharedBus,
    pub opener: Arc<dyn SourceOpener>,
    pub detectors: Arc<dyn DetectorFactory>,
    pub annotator: Arc<Annotator>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub metrics: PipelineMetrics,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub camera_id: String,
    pub source: SourceSpec,
    pub skip_frames: u32,
    pub region: Option<Region>,
    pub model: String,
    pub classes: Vec<u16>,
    pub backoff: Backoff,
}

/// What a single loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Processed,
    Skipped,
    Recovered,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub camera_id: String,
    pub frames_processed: u64,
}

/// Capture → detect → annotate → publish loop for one camera.
pub struct CameraWorker {
    config: SessionConfig,
    deps: WorkerDeps,
    source: Box<dyn FrameSource>,
    admission: FrameAdmission,
    region: RegionTracker,
    models: ModelCache,
    crops: VecDeque<u32>,
    failures: u32,
    inference_failing: bool,
    processed: u64,
}

impl CameraWorker {
    /// Opens the source. Failure here is final: no session is created.
    pub fn start(config: SessionConfig, deps: WorkerDeps) -> Result<Self, PipelineError> {
        if config.camera_id.trim().is_empty() {
            return Err(PipelineError::InvalidCameraId(config.camera_id));
        }
        let source = deps.opener.open(&config.source)?;
        tracing::info!(
            camera_id = %config.camera_id,
            source = %config.source,
            skip_frames = config.skip_frames,
            region = config.region.is_some(),
            "Camera session created"
        );
        Ok(Self {
            admission: FrameAdmission::new(config.skip_frames),
            region: RegionTracker::new(config.region.clone()),
            models: ModelCache::new(Arc::clone(&deps.detectors)),
            crops: VecDeque::new(),
            failures: 0,
            inference_failing: false,
            processed: 0,
            source,
            config,
            deps,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.config.camera_id
    }

    pub fn frames_processed(&self) -> u64 {
        self.processed
    }

    pub fn region_occupied(&self) -> bool {
        self.region.is_occupied()
    }

    /// Handle that unblocks a read in progress on this worker's source.
    pub fn interrupt(&self) -> Interrupt {
        self.source.interrupt()
    }

    pub fn run(self, stop: &AtomicBool) -> WorkerExit {
        self.run_until(stop, &AtomicBool::new(false))
    }

    /// Runs until `stop` is set. When `handed_over` is also set by then, a
    /// newer session owns the camera and the stream flags are left on.
    pub fn run_until(mut self, stop: &AtomicBool, handed_over: &AtomicBool) -> WorkerExit {
        tracing::info!(camera_id = %self.config.camera_id, "Camera loop started");
        while !stop.load(Ordering::SeqCst) {
            if self.step(stop) == Step::Stopped {
                break;
            }
        }
        self.shutdown(handed_over.load(Ordering::SeqCst))
    }

    pub fn step(&mut self, stop: &AtomicBool) -> Step {
        if !self.source.is_open() {
            return self.reconnect(stop);
        }
        if self.admission.should_process() {
            match self.source.read() {
                Ok(frame) => {
                    self.admission.advance();
                    self.failures = 0;
                    self.process(frame);
                    Step::Processed
                }
                Err(e) => self.recover(e, stop),
            }
        } else {
            match self.source.grab() {
                Ok(()) => {
                    self.admission.advance();
                    Step::Skipped
                }
                Err(e) => self.recover(e, stop),
            }
        }
    }

    fn recover(&mut self, error: CaptureError, stop: &AtomicBool) -> Step {
        let camera_id = &self.config.camera_id;
        self.deps
            .metrics
            .capture_failures
            .add(1, &PipelineMetrics::camera(camera_id));

        if self.source.kind() == SourceKind::File && matches!(error, CaptureError::EndOfStream) {
            tracing::debug!(camera_id = %camera_id, "End of file, rewinding");
            match self.source.rewind() {
                Ok(()) => return Step::Recovered,
                Err(e) => tracing::warn!(camera_id = %camera_id, error = %e, "Rewind failed"),
            }
        } else {
            tracing::warn!(camera_id = %camera_id, error = %error, "Frame read failed, reconnecting");
        }
        self.source.release();
        self.reconnect(stop)
    }

    fn reconnect(&mut self, stop: &AtomicBool) -> Step {
        let delay = self.config.backoff.delay_for_attempt(self.failures);
        self.failures = self.failures.saturating_add(1);
        if !sleep_unless_stopped(delay, stop) {
            return Step::Stopped;
        }
        match self.source.reopen() {
            Ok(()) => tracing::info!(camera_id = %self.config.camera_id, "Source reconnected"),
            Err(e) => tracing::warn!(
                camera_id = %self.config.camera_id,
                attempt = self.failures,
                error = %e,
                "Reconnect failed"
            ),
        }
        Step::Recovered
    }

    fn process(&mut self, frame: RgbImage) {
        let camera_id = self.config.camera_id.clone();
        let bus = Arc::clone(&self.deps.bus);
        let raw_jpeg = match encode_jpeg(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Failed to encode frame");
                return;
            }
        };
        publish(bus.as_ref(), &keys::stream_frame(&camera_id), raw_jpeg.clone());
        publish(bus.as_ref(), &keys::stream_flag(&camera_id), keys::FLAG_ON.to_vec());

        let mut processed_jpeg = None;
        let started = Instant::now();
        let detected = self
            .models
            .get(&self.config.model)
            .and_then(|detector| detector.detect(&frame, &self.config.classes));
        let attrs = PipelineMetrics::camera(&camera_id);

        match detected {
            Ok(objects) => {
                self.deps
                    .metrics
                    .inference_duration
                    .record(started.elapsed().as_secs_f64(), &attrs);
                if self.inference_failing {
                    tracing::info!(camera_id = %camera_id, "Detector recovered");
                    self.inference_failing = false;
                }

                let inside: Vec<bool> = objects
                    .iter()
                    .map(|o| self.region.contains(Point::from(o.bbox.centroid())))
                    .collect();
                self.store_crops(&frame, &objects);

                let mut annotated = frame.clone();
                let annotations: Vec<Annotation<'_>> = objects
                    .iter()
                    .zip(&inside)
                    .map(|(object, inside)| Annotation {
                        object,
                        inside: Some(*inside),
                    })
                    .collect();
                self.deps
                    .annotator
                    .annotate(&mut annotated, &annotations, self.region.region());

                if let Some(edge) = self.region.observe(inside.iter().any(|i| *i)) {
                    self.on_edge(edge, &frame, &raw_jpeg, &objects, &inside);
                }

                match encode_jpeg(&annotated) {
                    Ok(bytes) => processed_jpeg = Some(bytes),
                    Err(e) => tracing::warn!(camera_id = %camera_id, error = %e, "Failed to encode annotated frame"),
                }
            }
            Err(e) => {
                self.deps.metrics.inference_failures.add(1, &attrs);
                if self.inference_failing {
                    tracing::debug!(camera_id = %camera_id, error = %e, "Detection still failing");
                } else {
                    tracing::warn!(camera_id = %camera_id, error = %e, "Detection failed, publishing raw frames");
                    self.inference_failing = true;
                }
            }
        }

        let processed_jpeg = processed_jpeg.unwrap_or(raw_jpeg);
        publish(bus.as_ref(), &keys::processed_frame(&camera_id), processed_jpeg);
        publish(bus.as_ref(), &keys::processed_flag(&camera_id), keys::FLAG_ON.to_vec());

        self.processed += 1;
        self.deps.metrics.frames.add(1, &attrs);
        if self.processed.is_multiple_of(STATUS_INTERVAL) {
            tracing::debug!(
                camera_id = %camera_id,
                processed = self.processed,
                frame_counter = self.admission.frame_counter(),
                occupied = self.region.is_occupied(),
                "Status"
            );
        }
    }

    fn on_edge(
        &mut self,
        edge: Edge,
        frame: &RgbImage,
        raw_jpeg: &[u8],
        objects: &[TrackedObject],
        inside: &[bool],
    ) {
        let camera_id = &self.config.camera_id;
        let bus = self.deps.bus.as_ref();
        self.deps.metrics.presence_edges.add(
            1,
            &[
                opentelemetry::KeyValue::new("camera_id", camera_id.clone()),
                opentelemetry::KeyValue::new(
                    "edge",
                    match edge {
                        Edge::Enter => "enter",
                        Edge::Exit => "exit",
                    },
                ),
            ],
        );

        match edge {
            Edge::Enter => {
                tracing::info!(camera_id = %camera_id, "Vehicle entered region");
                publish(bus, keys::VEHICLE_IN, raw_jpeg.to_vec());

                let largest_inside = objects
                    .iter()
                    .zip(inside)
                    .filter(|(_, inside)| **inside)
                    .map(|(o, _)| o)
                    .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()));
                let snapshot = largest_inside
                    .and_then(|o| crop_jpeg(frame, o))
                    .unwrap_or_else(|| raw_jpeg.to_vec());
                match self.deps.snapshots.save(camera_id, &snapshot) {
                    Ok(path) => tracing::info!(camera_id = %camera_id, path = %path.display(), "Vehicle snapshot saved"),
                    Err(e) => tracing::warn!(camera_id = %camera_id, error = %e, "Failed to save vehicle snapshot"),
                }
            }
            Edge::Exit => {
                tracing::info!(camera_id = %camera_id, "Vehicle left region");
                clear(bus, keys::VEHICLE_IN);
            }
        }
    }

    fn store_crops(&mut self, frame: &RgbImage, objects: &[TrackedObject]) {
        let bus = Arc::clone(&self.deps.bus);
        for object in objects {
            let Some(track_id) = object.track_id else {
                continue;
            };
            let Some(jpeg) = crop_jpeg(frame, object) else {
                continue;
            };
            publish(bus.as_ref(), &keys::vehicle_crop(&self.config.camera_id, track_id), jpeg);

            if let Some(pos) = self.crops.iter().position(|id| *id == track_id) {
                self.crops.remove(pos);
            }
            self.crops.push_back(track_id);
            while self.crops.len() > CROP_CACHE_LIMIT {
                if let Some(evicted) = self.crops.pop_front() {
                    clear(bus.as_ref(), &keys::vehicle_crop(&self.config.camera_id, evicted));
                }
            }
        }
    }

    fn shutdown(mut self, handed_over: bool) -> WorkerExit {
        let camera_id = self.config.camera_id.clone();
        let bus = self.deps.bus.as_ref();
        self.source.release();
        if !handed_over {
            publish(bus, &keys::stream_flag(&camera_id), keys::FLAG_OFF.to_vec());
            publish(bus, &keys::processed_flag(&camera_id), keys::FLAG_OFF.to_vec());
        }
        if self.region.is_occupied() {
            clear(bus, keys::VEHICLE_IN);
        }
        tracing::info!(
            camera_id = %camera_id,
            frames_processed = self.processed,
            handed_over,
            "Camera loop stopped"
        );
        WorkerExit {
            camera_id,
            frames_processed: self.processed,
        }
    }
}

fn crop_jpeg(frame: &RgbImage, object: &TrackedObject) -> Option<Vec<u8>> {
    let (x, y, w, h) = object.bbox.clamp_to(frame.width(), frame.height())?;
    let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
    encode_jpeg(&crop).ok()
}

/// Running capture loop: cancellation flag in, exit report out.
pub struct WorkerHandle {
    camera_id: String,
    stop: Arc<AtomicBool>,
    handed_over: Arc<AtomicBool>,
    interrupt: Interrupt,
    exit: mpsc::Receiver<WorkerExit>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Runs the worker on its own thread. The loop starts only once it holds
    /// `run_lock`, so loops sharing a lock never overlap.
    pub fn spawn(worker: CameraWorker, run_lock: Arc<Mutex<()>>) -> std::io::Result<Self> {
        let camera_id = worker.camera_id().to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let handed_over = Arc::new(AtomicBool::new(false));
        let interrupt = worker.interrupt();
        let (tx, exit) = mpsc::channel();
        let stop_flag = Arc::clone(&stop);
        let handover_flag = Arc::clone(&handed_over);
        let thread = thread::Builder::new()
            .name(format!("camera-{camera_id}"))
            .spawn(move || {
                let _running = run_lock.lock().unwrap_or_else(|p| p.into_inner());
                let report = worker.run_until(&stop_flag, &handover_flag);
                let _ = tx.send(report);
            })?;
        Ok(Self {
            camera_id,
            stop,
            handed_over,
            interrupt,
            exit,
            thread: Some(thread),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Sets the stop flag and releases the source, so a loop blocked in a
    /// read sees the flag as soon as the read fails.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.interrupt.fire();
    }

    /// Stops the loop on behalf of a newer session for the same camera.
    /// The loop exits without switching the stream flags off.
    pub fn hand_over(&self) {
        self.handed_over.store(true, Ordering::SeqCst);
        self.signal_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Waits up to `timeout` for the loop to exit.
    pub fn join_timeout(&mut self, timeout: Duration) -> Option<WorkerExit> {
        match self.exit.recv_timeout(timeout) {
            Ok(report) => {
                if let Some(thread) = self.thread.take()
                    && thread.join().is_err()
                {
                    tracing::error!(camera_id = %self.camera_id, "Camera thread panicked");
                }
                Some(report)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!(camera_id = %self.camera_id, "Camera thread exited without report");
                self.thread.take();
                None
            }
        }
    }
}
