// src/queue/mod.rs

pub mod job;
pub mod pipeline;
pub mod state;

use std::{
    collections::VecDeque,
    path::Path,
    sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::archive::{expand_bundle, is_bundle};
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::process::pool::CancelToken;
use crate::read;

pub use job::{Job, ProgressEvent, StatusSnapshot};
pub use pipeline::{failure_status, run_job, JobReport, StageHooks};
pub use state::Stage;

/// Everything the controller and the driver share.
#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    next_id: u64,
    running: bool,
    paused: bool,
    stopping: bool,
    current: Option<String>,
    stage: Option<Stage>,
    percent: u8,
    status: String,
    completed: usize,
    failed: usize,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    cancel: CancelToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO job queue with one background driver thread.
///
/// Jobs run one at a time. `pause` takes effect at the next checkpoint
/// (before a job or a stage); `stop` clears the queue and cancels the running
/// job. Only the driver writes progress.
pub struct Orchestrator {
    shared: Arc<Shared>,
    settings: Arc<Settings>,
    events: Option<mpsc::Sender<ProgressEvent>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(settings: Settings) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake: Condvar::new(),
                cancel: CancelToken::new(),
            }),
            settings: Arc::new(settings),
            events: None,
            driver: Mutex::new(None),
        }
    }

    /// Like [`Orchestrator::new`], also returning the progress event stream.
    pub fn with_events(settings: Settings) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut orchestrator = Self::new(settings);
        orchestrator.events = Some(tx);
        (orchestrator, rx)
    }

    /// Queues `path`, expanding a `.zip` bundle into one job per supported
    /// member. Returns the number of jobs added.
    pub fn enqueue(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            )));
        }

        if is_bundle(path) {
            let bundle = expand_bundle(path, &self.settings.work_root)?;
            if bundle.files.is_empty() {
                warn!(bundle = %path.display(), "bundle holds no supported files");
                return Ok(0);
            }
            let mut state = self.shared.lock();
            for file in &bundle.files {
                let id = next_id(&mut state);
                state
                    .pending
                    .push_back(Job::from_bundle(id, file.clone(), path, Arc::clone(&bundle.dir)));
            }
            info!(bundle = %path.display(), jobs = bundle.files.len(), "queued bundle");
            return Ok(bundle.files.len());
        }

        if !read::is_supported(path) {
            return Err(PipelineError::UnsupportedInput(path.to_path_buf()));
        }
        let mut state = self.shared.lock();
        let id = next_id(&mut state);
        state.pending.push_back(Job::new(id, path.to_path_buf()));
        info!(job = id, input = %path.display(), "queued");
        Ok(1)
    }

    /// Starts the driver if it is not already running.
    pub fn start(&self) -> Result<()> {
        let mut driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.shared.lock();
            if state.running {
                return Ok(());
            }
            state.running = true;
            state.stopping = false;
            state.completed = 0;
            state.failed = 0;
        }
        if let Some(previous) = driver.take() {
            let _ = previous.join();
        }
        self.shared.cancel.reset();

        let shared = Arc::clone(&self.shared);
        let settings = Arc::clone(&self.settings);
        let events = self.events.clone();
        let handle = thread::Builder::new()
            .name("job-driver".to_string())
            .spawn(move || drive(&shared, &settings, events.as_ref()))
            .map_err(|e| {
                self.shared.lock().running = false;
                PipelineError::Io(e)
            })?;
        *driver = Some(handle);
        Ok(())
    }

    /// Holds the driver at its next checkpoint. Pausing an idle queue holds
    /// the first job once `start` is called.
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        if !state.paused {
            state.paused = true;
            debug!("pause requested");
        }
    }

    pub fn resume(&self) {
        let mut state = self.shared.lock();
        if state.paused {
            state.paused = false;
            debug!("resume requested");
            self.shared.wake.notify_all();
        }
    }

    /// Clears the queue and cancels the running job.
    pub fn stop(&self) {
        let dropped: Vec<Job> = {
            let mut state = self.shared.lock();
            state.stopping = state.running;
            state.paused = false;
            self.shared.cancel.cancel();
            self.shared.wake.notify_all();
            state.pending.drain(..).collect()
        };
        info!(dropped = dropped.len(), "stop requested");
        // releases bundle directories outside the lock
        drop(dropped);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.shared.lock();
        StatusSnapshot {
            running: state.running,
            paused: state.paused,
            current: state.current.clone(),
            stage: state.stage,
            percent: state.percent,
            status: state.status.clone(),
            queued: state.pending.iter().map(Job::name).collect(),
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Blocks until the driver has drained the queue or stopped.
    pub fn wait(&self) {
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("job driver panicked");
                self.shared.lock().running = false;
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn next_id(state: &mut QueueState) -> u64 {
    state.next_id += 1;
    state.next_id
}

/// The driver's handle on shared state while one job runs.
struct DriverHooks<'a> {
    shared: &'a Shared,
    events: Option<&'a mpsc::Sender<ProgressEvent>>,
    job: String,
    stage: Stage,
}

impl DriverHooks<'_> {
    fn publish(&self, state: &QueueState) {
        if let Some(tx) = self.events {
            let _ = tx.send(ProgressEvent {
                job: state.current.clone(),
                stage: state.stage,
                percent: state.percent,
                status: state.status.clone(),
            });
        }
    }

    fn finish(&mut self, stage: Stage, status: String) {
        self.stage = stage;
        let mut state = self.shared.lock();
        state.stage = Some(stage);
        state.status = status;
        if stage == Stage::Done {
            state.percent = 100;
        }
        self.publish(&state);
    }
}

impl StageHooks for DriverHooks<'_> {
    fn checkpoint(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.paused && !state.stopping {
            state.status = "Paused".to_string();
            self.publish(&state);
            info!(job = %self.job, "paused");
            while state.paused && !state.stopping {
                state = self
                    .shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !state.stopping {
                state.status = format!("Processing {}...", self.job);
                self.publish(&state);
                info!(job = %self.job, "resumed");
            }
        }
        if state.stopping {
            return Err(PipelineError::Cancelled);
        }
        self.shared.cancel.check()
    }

    fn report(&mut self, stage: Stage, percent: u8) {
        let mut state = self.shared.lock();
        if state.stage == Some(stage) && state.percent == percent {
            return;
        }
        if self.stage != stage {
            debug!(job = %self.job, %stage, "stage");
        }
        self.stage = stage;
        state.stage = Some(stage);
        state.percent = percent;
        self.publish(&state);
    }

    fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }
}

/// Waits at a job boundary while paused; false once stopping.
fn wait_for_turn(shared: &Shared, events: Option<&mpsc::Sender<ProgressEvent>>) -> Option<Job> {
    let mut state = shared.lock();
    if state.paused && !state.stopping {
        state.status = "Paused".to_string();
        if let Some(tx) = events {
            let _ = tx.send(ProgressEvent {
                job: None,
                stage: None,
                percent: state.percent,
                status: state.status.clone(),
            });
        }
        while state.paused && !state.stopping {
            state = shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
    if state.stopping {
        return None;
    }
    let job = state.pending.pop_front()?;
    state.current = Some(job.name());
    state.stage = Some(Stage::Queued);
    state.percent = 0;
    state.status = format!("Processing {}...", job.name());
    Some(job)
}

fn drive(shared: &Shared, settings: &Settings, events: Option<&mpsc::Sender<ProgressEvent>>) {
    info!("job driver started");
    while let Some(job) = wait_for_turn(shared, events) {
        let mut hooks = DriverHooks {
            shared,
            events,
            job: job.name(),
            stage: Stage::Queued,
        };
        {
            let state = shared.lock();
            hooks.publish(&state);
        }

        match run_job(&job, settings, &mut hooks) {
            Ok(report) => {
                info!(
                    job = %hooks.job,
                    partitions = report.partitions,
                    skipped = report.skipped.len(),
                    "job completed"
                );
                shared.lock().completed += 1;
                let status = format!("{} completed", hooks.job);
                hooks.finish(Stage::Done, status);
            }
            Err(e) if e.is_cancelled() => {
                info!(job = %hooks.job, stage = %hooks.stage, "job cancelled");
                hooks.finish(Stage::Cancelled, "Stopped".to_string());
            }
            Err(e) => {
                error!(job = %hooks.job, stage = %hooks.stage, error = %e, "job failed");
                shared.lock().failed += 1;
                let status = failure_status(&e, hooks.stage);
                hooks.finish(Stage::Failed, status);
            }
        }
        // drops the bundle handle, if any
        drop(job);
    }

    let mut state = shared.lock();
    state.running = false;
    state.paused = false;
    state.current = None;
    state.status = if state.stopping {
        "Stopped".to_string()
    } else {
        "All tasks completed".to_string()
    };
    state.stopping = false;
    if let Some(tx) = events {
        let _ = tx.send(ProgressEvent {
            job: None,
            stage: None,
            percent: state.percent,
            status: state.status.clone(),
        });
    }
    info!(
        completed = state.completed,
        failed = state.failed,
        status = %state.status,
        "job driver finished"
    );
}
