use crate::error::PipelineError;
use crate::worker::{CameraWorker, SessionConfig, WorkerDeps, WorkerExit, WorkerHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    Replaced,
}

/// Owns every camera session, keyed by camera id.
///
/// `start` and `stop` are the only mutating operations. Each camera id has a
/// run lock that its loop holds while running, so a replacement loop begins
/// only after the one it replaces has released its capture handle.
///
/// A loop that outlives the stop timeout is kept in `draining` until it
/// exits. Starting that camera again fails with `Busy` in the meantime.
pub struct SessionRegistry {
    deps: WorkerDeps,
    sessions: Mutex<HashMap<String, WorkerHandle>>,
    draining: Mutex<HashMap<String, WorkerHandle>>,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stop_timeout: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl SessionRegistry {
    pub fn new(deps: WorkerDeps) -> Self {
        Self::with_stop_timeout(deps, DEFAULT_STOP_TIMEOUT)
    }

    pub fn with_stop_timeout(deps: WorkerDeps, stop_timeout: Duration) -> Self {
        Self {
            deps,
            sessions: Mutex::new(HashMap::new()),
            draining: Mutex::new(HashMap::new()),
            run_locks: Mutex::new(HashMap::new()),
            stop_timeout,
        }
    }

    fn run_lock(&self, camera_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            lock(&self.run_locks)
                .entry(camera_id.to_string())
                .or_default(),
        )
    }

    /// Drops the run lock once no loop for the camera holds a clone of it.
    fn forget_run_lock(&self, camera_id: &str) {
        let mut locks = lock(&self.run_locks);
        if locks.get(camera_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(camera_id);
        }
    }

    fn park(&self, handle: WorkerHandle) {
        tracing::warn!(camera_id = %handle.camera_id(), "Session did not stop within timeout");
        lock(&self.draining).insert(handle.camera_id().to_string(), handle);
    }

    /// Forgets drained loops that have exited; errors if `camera_id` still has one.
    fn check_not_draining(&self, camera_id: &str) -> Result<(), PipelineError> {
        let finished: Vec<String> = {
            let mut draining = lock(&self.draining);
            let finished: Vec<String> = draining
                .iter()
                .filter(|(_, h)| h.is_finished())
                .map(|(id, _)| id.clone())
                .collect();
            for id in &finished {
                draining.remove(id);
            }
            if draining.contains_key(camera_id) {
                return Err(PipelineError::Busy(camera_id.to_string()));
            }
            finished
        };
        for id in &finished {
            tracing::info!(camera_id = %id, "Stalled session finally exited");
            self.forget_run_lock(id);
        }
        Ok(())
    }

    /// Opens the source and starts the loop, replacing any running session
    /// for the same camera. If the source cannot be opened the existing
    /// session is left untouched.
    pub fn start(&self, config: SessionConfig) -> Result<StartOutcome, PipelineError> {
        let camera_id = config.camera_id.clone();
        self.check_not_draining(&camera_id)?;
        let worker = CameraWorker::start(config, self.deps.clone())?;
        let handle = WorkerHandle::spawn(worker, self.run_lock(&camera_id))?;

        let previous = lock(&self.sessions).insert(camera_id.clone(), handle);
        match previous {
            Some(mut previous) => {
                previous.hand_over();
                if previous.join_timeout(self.stop_timeout).is_none() {
                    self.park(previous);
                }
                tracing::info!(camera_id = %camera_id, "Camera session replaced");
                Ok(StartOutcome::Replaced)
            }
            None => {
                tracing::info!(camera_id = %camera_id, "Camera session started");
                Ok(StartOutcome::Started)
            }
        }
    }

    /// Signals the loop and waits a bounded time for it to exit.
    pub fn stop(&self, camera_id: &str) -> Result<Option<WorkerExit>, PipelineError> {
        let mut handle = lock(&self.sessions)
            .remove(camera_id)
            .ok_or_else(|| PipelineError::NotFound(camera_id.to_string()))?;
        handle.signal_stop();
        let exit = handle.join_timeout(self.stop_timeout);
        match exit {
            Some(_) => self.forget_run_lock(camera_id),
            None => self.park(handle),
        }
        tracing::info!(camera_id, "Camera session stopped");
        Ok(exit)
    }

    pub fn stop_all(&self) {
        let handles: Vec<WorkerHandle> = lock(&self.sessions).drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.signal_stop();
        }
        for mut handle in handles {
            match handle.join_timeout(self.stop_timeout) {
                Some(exit) => self.forget_run_lock(&exit.camera_id),
                None => self.park(handle),
            }
        }
    }

    /// Ids of sessions whose loop is still running, sorted.
    pub fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.sessions)
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_active(&self, camera_id: &str) -> bool {
        lock(&self.sessions)
            .get(camera_id)
            .is_some_and(|h| !h.is_finished())
    }

    /// Number of camera ids holding a run lock, draining loops included.
    pub fn tracked(&self) -> usize {
        lock(&self.run_locks).len()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
