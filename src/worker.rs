use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use crate::error::{Result, TelloError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

/// Background loop calling a step function until stopped.
///
/// The worker imposes no delay between steps, pacing belongs to the step
/// (usually a bounded socket read or a sleep). A failing or panicking step is
/// logged and the loop goes on with the next iteration. Stopping is
/// cooperative: the flag is checked before each step, so a step blocked on a
/// read finishes its read timeout first. A stopped worker can't be restarted.
#[derive(Debug)]
pub struct CyclicWorker {
    name: String,
    stop: Arc<AtomicBool>,
    failures: Arc<AtomicU64>,
    state: Mutex<WorkerState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CyclicWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            stop: Arc::new(AtomicBool::new(false)),
            failures: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(WorkerState::Idle),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Number of steps that returned an error or panicked.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Launches the loop. Calling it on a running worker is a no-op.
    pub fn start<F>(&self, mut step: F) -> Result<()>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let method_name = "worker_start";
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            WorkerState::Running => return Ok(()),
            WorkerState::Stopped => return Err(TelloError::WorkerStopped(self.name.clone())),
            WorkerState::Idle => {}
        }

        let stop = self.stop.clone();
        let failures = self.failures.clone();
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let method_name = "worker_loop";
                tracing::debug!(method_name, name = name.as_str(), "loop started");
                while !stop.load(Ordering::Acquire) {
                    match panic::catch_unwind(AssertUnwindSafe(&mut step)) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(method_name, name = name.as_str(), "step failed: {e}");
                        }
                        Err(_) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(method_name, name = name.as_str(), "step panicked");
                        }
                    }
                }
                tracing::debug!(method_name, name = name.as_str(), "loop finished");
            })?;
        *self.handle.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        *state = WorkerState::Running;
        tracing::info!(method_name, name = self.name.as_str(), "started");
        Ok(())
    }

    /// Requests termination. Idempotent and safe from any thread.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != WorkerState::Stopped {
            tracing::info!(method_name = "worker_stop", name = self.name.as_str(), "stop requested");
        }
        self.stop.store(true, Ordering::Release);
        *state = WorkerState::Stopped;
    }

    /// Waits for the loop thread to exit. Does nothing when called from the
    /// loop thread itself or when the worker never ran.
    pub fn join(&self) {
        let handle = self.handle.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(h) = handle {
            if h.thread().id() == thread::current().id() {
                return;
            }
            if h.join().is_err() {
                tracing::warn!(method_name = "worker_join", name = self.name.as_str(), "loop thread panicked");
            }
        }
    }
}

impl Drop for CyclicWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
