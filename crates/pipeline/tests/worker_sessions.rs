//! Integration tests for a single camera loop driven step by step.
//!
//! Tests:
//! - Presence edges fire once per transition, not once per frame
//! - Frame admission and file rewinding
//! - Live sources reconnect after a read failure
//! - Detection failures keep frames flowing and leave presence untouched
//! - An unreachable bus never stops the loop
//! - A handed-over loop leaves the stream flags on

mod support;

use bus::keys;
use capture::SourceSpec;
use pipeline::{CameraWorker, PipelineError, Region, SessionConfig, Step};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use support::{FailingBus, Harness, ScriptedOpener, fast_backoff};

const CAMERA: &str = "gate";

fn session(skip_frames: u32, region: Option<Region>) -> SessionConfig {
    SessionConfig {
        camera_id: CAMERA.to_string(),
        source: SourceSpec::File("demo/gate.mp4".into()),
        skip_frames,
        region,
        model: "yolo11n".to_string(),
        classes: vec![2, 3, 5, 7],
        backoff: fast_backoff(),
    }
}

fn whole_frame() -> Option<Region> {
    Some(Region::from_rect(0.0, 0.0, 64.0, 48.0).unwrap())
}

fn run_steps(worker: &mut CameraWorker, n: usize) -> Vec<Step> {
    let stop = AtomicBool::new(false);
    (0..n).map(|_| worker.step(&stop)).collect()
}

// ========== Presence edges ==========

#[test]
fn sustained_presence_publishes_once() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();

    let steps = run_steps(&mut worker, 50);

    assert!(steps.iter().all(|s| *s == Step::Processed));
    assert_eq!(harness.bus.sets(keys::VEHICLE_IN), 1, "one entry edge for 50 frames inside");
    assert_eq!(harness.snapshots.saved.lock().unwrap().len(), 1, "one snapshot per entry");
    assert!(worker.region_occupied());
    assert!(harness.bus.value(keys::VEHICLE_IN).is_some());
}

#[test]
fn leaving_clears_vehicle_in_once() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();
    run_steps(&mut worker, 5);

    harness.script().present.store(false, Ordering::SeqCst);
    run_steps(&mut worker, 10);

    assert_eq!(harness.bus.deletes(keys::VEHICLE_IN), 1, "one exit edge");
    assert_eq!(harness.bus.value(keys::VEHICLE_IN), None);
    assert!(!worker.region_occupied());
}

#[test]
fn no_region_never_signals_presence() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, None), harness.deps()).unwrap();

    run_steps(&mut worker, 10);

    assert_eq!(harness.bus.sets(keys::VEHICLE_IN), 0);
    assert!(harness.snapshots.saved.lock().unwrap().is_empty());
    assert!(
        harness.bus.value(&keys::vehicle_crop(CAMERA, 1)).is_some(),
        "tracked crops are still published"
    );
}

#[test]
fn snapshot_is_a_crop_of_the_vehicle() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();

    run_steps(&mut worker, 1);

    let saved = harness.snapshots.saved.lock().unwrap();
    let (camera, jpeg) = &saved[0];
    assert_eq!(camera, CAMERA);
    let crop = image::load_from_memory(jpeg).unwrap();
    assert_eq!((crop.width(), crop.height()), (32, 24), "crop matches the detection box");
}

// ========== Admission and rewinding ==========

#[test]
fn skip_frames_limits_detection() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    let mut worker = CameraWorker::start(session(3, None), harness.deps()).unwrap();

    let steps = run_steps(&mut worker, 9);

    assert_eq!(*harness.script().seen.lock().unwrap(), vec![0, 3, 6]);
    assert_eq!(steps.iter().filter(|s| **s == Step::Skipped).count(), 6);
    assert_eq!(worker.frames_processed(), 3);
}

#[test]
fn file_source_rewinds_at_end() {
    let harness = Harness::new(ScriptedOpener::file(3));
    let mut worker = CameraWorker::start(session(1, None), harness.deps()).unwrap();

    let steps = run_steps(&mut worker, 5);

    assert_eq!(
        steps,
        vec![Step::Processed, Step::Processed, Step::Processed, Step::Recovered, Step::Processed]
    );
    assert_eq!(harness.opener.stats.rewinds.load(Ordering::SeqCst), 1);
    assert_eq!(harness.opener.stats.reopens.load(Ordering::SeqCst), 0);
    assert_eq!(*harness.script().seen.lock().unwrap(), vec![0, 1, 2, 0]);
}

// ========== Reconnection ==========

#[test]
fn live_source_reconnects_after_failure() {
    let harness = Harness::new(ScriptedOpener::live());
    let mut worker = CameraWorker::start(session(1, None), harness.deps()).unwrap();
    run_steps(&mut worker, 2);

    harness.opener.stats.fail_next_read.store(true, Ordering::SeqCst);
    let steps = run_steps(&mut worker, 2);

    assert_eq!(steps, vec![Step::Recovered, Step::Processed]);
    assert_eq!(harness.opener.stats.reopens.load(Ordering::SeqCst), 1);
    assert_eq!(harness.opener.stats.rewinds.load(Ordering::SeqCst), 0);
}

#[test]
fn reconnect_wait_honours_stop() {
    let harness = Harness::new(ScriptedOpener::live());
    let mut config = session(1, None);
    config.backoff = common::Backoff::new(
        std::time::Duration::from_secs(30),
        std::time::Duration::from_secs(30),
    );
    let mut worker = CameraWorker::start(config, harness.deps()).unwrap();
    harness.opener.stats.fail_next_read.store(true, Ordering::SeqCst);

    let stop = AtomicBool::new(true);
    assert_eq!(worker.step(&stop), Step::Stopped);
    assert_eq!(harness.opener.stats.reopens.load(Ordering::SeqCst), 0);
}

// ========== Detection failures ==========

#[test]
fn inference_failure_publishes_raw_frame() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().fail.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();

    assert_eq!(run_steps(&mut worker, 1), vec![Step::Processed]);

    let raw = harness.bus.value(&keys::stream_frame(CAMERA)).unwrap();
    let processed = harness.bus.value(&keys::processed_frame(CAMERA)).unwrap();
    assert_eq!(raw, processed, "unannotated frame stands in for the processed one");
    assert_eq!(harness.bus.value(&keys::processed_flag(CAMERA)), Some(b"1".to_vec()));
}

#[test]
fn inference_failure_keeps_presence_state() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();
    run_steps(&mut worker, 3);

    harness.script().fail.store(true, Ordering::SeqCst);
    run_steps(&mut worker, 5);

    assert!(worker.region_occupied());
    assert_eq!(harness.bus.deletes(keys::VEHICLE_IN), 0);
}

#[test]
fn unreachable_bus_keeps_frames_processing() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let bus = Arc::new(FailingBus::default());
    let mut deps = harness.deps();
    deps.bus = bus.clone();
    let mut worker = CameraWorker::start(session(1, whole_frame()), deps).unwrap();

    let steps = run_steps(&mut worker, 5);

    assert!(
        steps.iter().all(|s| *s == Step::Processed),
        "bus failures are logged, not fatal: {steps:?}"
    );
    assert!(bus.attempts.load(Ordering::SeqCst) > 0);
    assert_eq!(worker.frames_processed(), 5);
    assert_eq!(harness.script().seen.lock().unwrap().len(), 5, "detection kept running");
}

// ========== Lifecycle ==========

#[test]
fn shutdown_lowers_flags_and_clears_presence() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();
    run_steps(&mut worker, 2);

    let exit = worker.run(&AtomicBool::new(true));

    assert_eq!(exit.camera_id, CAMERA);
    assert_eq!(exit.frames_processed, 2);
    assert_eq!(harness.bus.value(&keys::stream_flag(CAMERA)), Some(b"0".to_vec()));
    assert_eq!(harness.bus.value(&keys::processed_flag(CAMERA)), Some(b"0".to_vec()));
    assert_eq!(harness.bus.value(keys::VEHICLE_IN), None);
}

#[test]
fn handed_over_loop_leaves_flags_on() {
    let harness = Harness::new(ScriptedOpener::file(1_000));
    harness.script().present.store(true, Ordering::SeqCst);
    let mut worker = CameraWorker::start(session(1, whole_frame()), harness.deps()).unwrap();
    run_steps(&mut worker, 2);

    let exit = worker.run_until(&AtomicBool::new(true), &AtomicBool::new(true));

    assert_eq!(exit.frames_processed, 2);
    assert_eq!(harness.bus.value(&keys::stream_flag(CAMERA)), Some(b"1".to_vec()));
    assert_eq!(harness.bus.value(&keys::processed_flag(CAMERA)), Some(b"1".to_vec()));
    assert_eq!(harness.bus.value(keys::VEHICLE_IN), None, "presence is still cleared");
}

#[test]
fn start_rejects_empty_id_and_unopenable_source() {
    let harness = Harness::new(ScriptedOpener::file(10));
    let mut config = session(1, None);
    config.camera_id = "  ".into();
    assert!(matches!(
        CameraWorker::start(config, harness.deps()),
        Err(PipelineError::InvalidCameraId(_))
    ));

    harness.opener.fail_open.store(true, Ordering::SeqCst);
    assert!(matches!(
        CameraWorker::start(session(1, None), harness.deps()),
        Err(PipelineError::Capture(_))
    ));
}
