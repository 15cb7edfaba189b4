//! Searchlab Audit Scheduler
//!
//! Runs audit tasks in fixed cycles on a dedicated driver thread. Tasks run
//! one after another as long as a cycle fits into its period. Once a cycle
//! overruns, the scheduler switches for good to running each task on its
//! own worker thread, with at most one run per task in flight.
//!
//! Key Features:
//! - Fixed-rate cycles measured from cycle start
//! - Permanent escalation from sequential to concurrent execution
//! - Cooperative shutdown that wakes the end-of-cycle sleep
//! - Independent per-task periods via [`FrequencyScheduler`]
//!
//! @version 0.1.0
//! @author Searchlab Development Team

use crate::task::AuditTask;
use parking_lot::{Condvar, Mutex};
use searchlab_common::{Result, SearchlabError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// =============================================================================
// Scheduler Mode
// =============================================================================

/// Execution mode of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerMode {
    /// Not started yet.
    Idle = 0,
    /// Tasks run one after another on the driver thread.
    Sequential = 1,
    /// Each task runs on its own worker thread.
    Concurrent = 2,
}

impl SchedulerMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SchedulerMode::Sequential,
            2 => SchedulerMode::Concurrent,
            _ => SchedulerMode::Idle,
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct SchedulerState {
    running: AtomicBool,
    mode: AtomicU8,
    cycles: AtomicU64,
    sleep_lock: Mutex<()>,
    wake: Condvar,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            mode: AtomicU8::new(SchedulerMode::Idle as u8),
            cycles: AtomicU64::new(0),
            sleep_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn mode(&self) -> SchedulerMode {
        SchedulerMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Sleep for `duration` unless stopped first.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = self.sleep_lock.lock();
        while self.is_running() && Instant::now() < deadline {
            self.wake.wait_until(&mut guard, deadline);
        }
    }

    fn stop(&self) {
        let _guard = self.sleep_lock.lock();
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_all();
    }
}

// =============================================================================
// Audit Scheduler
// =============================================================================

/// Periodic driver for a fixed list of audit tasks.
pub struct AuditScheduler {
    name: String,
    tasks: Vec<Arc<dyn AuditTask>>,
    period: Duration,
    escalate_below: Duration,
    state: Arc<SchedulerState>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl AuditScheduler {
    /// Scheduler escalating to concurrent mode once a cycle takes at least
    /// `period`.
    pub fn new(period: Duration, tasks: Vec<Arc<dyn AuditTask>>) -> Self {
        Self::with_headroom("audit-scheduler", period, Duration::ZERO, tasks)
    }

    /// Scheduler escalating once less than `headroom` of the period remains
    /// after a cycle.
    pub fn with_headroom(
        name: &str,
        period: Duration,
        headroom: Duration,
        tasks: Vec<Arc<dyn AuditTask>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            tasks,
            period,
            escalate_below: headroom,
            state: Arc::new(SchedulerState::new()),
            driver: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn mode(&self) -> SchedulerMode {
        self.state.mode()
    }

    /// Completed cycles since start.
    pub fn cycles(&self) -> u64 {
        self.state.cycles.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Start the driver thread.
    pub fn start(&self) -> Result<()> {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return Err(SearchlabError::Internal(format!(
                "scheduler {} already started",
                self.name
            )));
        }
        self.state.running.store(true, Ordering::SeqCst);
        self.state
            .mode
            .store(SchedulerMode::Sequential as u8, Ordering::SeqCst);

        let cycle = Cycle {
            name: self.name.clone(),
            tasks: self.tasks.clone(),
            period: self.period,
            escalate_below: self.escalate_below,
            state: Arc::clone(&self.state),
        };
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || cycle.run())
            .map_err(|e| {
                self.state.running.store(false, Ordering::SeqCst);
                SearchlabError::Io(e)
            })?;
        *driver = Some(handle);
        tracing::info!(
            "scheduler {} started with {} tasks every {:?}",
            self.name,
            self.tasks.len(),
            self.period
        );
        Ok(())
    }

    /// Stop after the current cycle. Running tasks are joined, not
    /// interrupted.
    pub fn stop(&self) {
        self.state.stop();
        if let Some(handle) = self.driver.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("scheduler {} driver panicked", self.name);
            }
            tracing::info!("scheduler {} stopped after {} cycles", self.name, self.cycles());
        }
    }
}

impl Drop for AuditScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Driver Loop
// =============================================================================

struct Cycle {
    name: String,
    tasks: Vec<Arc<dyn AuditTask>>,
    period: Duration,
    escalate_below: Duration,
    state: Arc<SchedulerState>,
}

impl Cycle {
    fn run(self) {
        let mut workers: Vec<Option<JoinHandle<()>>> = self.tasks.iter().map(|_| None).collect();

        while self.state.is_running() {
            let start = Instant::now();

            if self.state.mode() == SchedulerMode::Concurrent {
                for (task, worker) in self.tasks.iter().zip(workers.iter_mut()) {
                    if let Some(previous) = worker.take() {
                        join_worker(previous, task.name());
                    }
                    *worker = spawn_worker(task);
                }
            } else {
                for task in &self.tasks {
                    run_task(task.as_ref());
                }
            }
            self.state.cycles.fetch_add(1, Ordering::SeqCst);

            let remaining = self.period.saturating_sub(start.elapsed());
            if remaining <= self.escalate_below && self.state.mode() != SchedulerMode::Concurrent {
                tracing::warn!(
                    "scheduler {} overran its {:?} period, running tasks concurrently",
                    self.name,
                    self.period
                );
                self.state
                    .mode
                    .store(SchedulerMode::Concurrent as u8, Ordering::SeqCst);
            }
            if !remaining.is_zero() {
                self.state.sleep(remaining);
            }
        }

        for (task, worker) in self.tasks.iter().zip(workers) {
            if let Some(handle) = worker {
                join_worker(handle, task.name());
            }
        }
    }
}

fn run_task(task: &dyn AuditTask) {
    if panic::catch_unwind(AssertUnwindSafe(|| task.check())).is_err() {
        tracing::warn!("audit task {} panicked", task.name());
    }
}

fn spawn_worker(task: &Arc<dyn AuditTask>) -> Option<JoinHandle<()>> {
    let worker_task = Arc::clone(task);
    match thread::Builder::new()
        .name(format!("audit-{}", task.name()))
        .spawn(move || worker_task.check())
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("failed to spawn worker for {}: {}", task.name(), e);
            run_task(task.as_ref());
            None
        }
    }
}

fn join_worker(handle: JoinHandle<()>, name: &str) {
    if handle.join().is_err() {
        tracing::warn!("audit task {} panicked", name);
    }
}

// =============================================================================
// Frequency Scheduler
// =============================================================================

/// Set of single-task schedulers, each with its own period. A job escalates
/// to concurrent runs once less than a tenth of its period remains after a
/// run.
#[derive(Default)]
pub struct FrequencyScheduler {
    jobs: Vec<AuditScheduler>,
}

impl FrequencyScheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Start running `task` every `period`.
    pub fn add_job(&mut self, task: Arc<dyn AuditTask>, period: Duration) -> Result<()> {
        let name = format!("frequency-{}", task.name());
        let job = AuditScheduler::with_headroom(&name, period, period / 10, vec![task]);
        job.start()?;
        self.jobs.push(job);
        Ok(())
    }

    pub fn jobs(&self) -> &[AuditScheduler] {
        &self.jobs
    }

    /// Stop all jobs.
    pub fn shutdown(&mut self) {
        for job in &self.jobs {
            job.stop();
        }
        self.jobs.clear();
    }
}
