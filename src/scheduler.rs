//! Periodic tick scheduling.
//!
//! The extractor never sleeps or spawns on its own; it asks a
//! [`PeriodicScheduler`] to call a task at a fixed interval and keeps the
//! returned [`ScheduledTick`] to cancel it later.
//!
//! Two schedulers ship with the crate:
//!
//! - [`TickScheduler`] runs every scheduled task on one dedicated thread,
//!   sleeping until the earliest deadline. Late ticks are coalesced rather
//!   than replayed, and a panicking task is caught so other sessions keep
//!   ticking.
//! - [`ManualScheduler`] runs nothing by itself. The host calls
//!   [`fire`](ManualScheduler::fire) from its own loop (a display link, a
//!   game loop, a test).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! use frametap::{ManualScheduler, PeriodicScheduler};
//!
//! let scheduler = ManualScheduler::new();
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&ticks);
//! let tick = scheduler.schedule(
//!     Duration::from_millis(16),
//!     Arc::new(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }),
//! )?;
//!
//! scheduler.fire();
//! tick.cancel();
//! scheduler.fire();
//! assert_eq!(ticks.load(Ordering::SeqCst), 1);
//! # Ok::<(), frametap::FrameTapError>(())
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::FrameTapError;

/// Work run on every tick.
pub type TickTask = Arc<dyn Fn() + Send + Sync>;

/// A scheduled periodic task.
pub trait ScheduledTick: Send {
    /// Stop invoking the task.
    ///
    /// Never blocks on an in-flight invocation. A tick that already started
    /// may still finish after this returns, so tasks re-check their own state.
    fn cancel(self: Box<Self>);
}

/// Invokes a task at a fixed interval until it is cancelled.
pub trait PeriodicScheduler: Send + Sync {
    /// Call `task` every `interval`, starting one interval from now.
    ///
    /// # Errors
    ///
    /// [`FrameTapError::Scheduler`] if the scheduler has shut down.
    fn schedule(
        &self,
        interval: Duration,
        task: TickTask,
    ) -> Result<Box<dyn ScheduledTick>, FrameTapError>;
}

enum Control {
    Schedule(Entry),
    Cancel(u64),
    Shutdown,
}

struct Entry {
    id: u64,
    interval: Duration,
    deadline: Instant,
    task: TickTask,
    cancelled: Arc<AtomicBool>,
}

/// Runs every scheduled task on a single dedicated thread.
///
/// Dropping the scheduler shuts the thread down; tasks still scheduled at
/// that point are never called again.
pub struct TickScheduler {
    sender: Sender<Control>,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl TickScheduler {
    /// Start the tick thread.
    ///
    /// # Errors
    ///
    /// [`FrameTapError::Io`] if the thread cannot be spawned.
    pub fn new() -> Result<Self, FrameTapError> {
        Self::with_thread_name("frametap-tick")
    }

    /// Start the tick thread under a custom name.
    ///
    /// # Errors
    ///
    /// [`FrameTapError::Io`] if the thread cannot be spawned.
    pub fn with_thread_name(name: impl Into<String>) -> Result<Self, FrameTapError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let active = Arc::new(AtomicUsize::new(0));
        let loop_active = Arc::clone(&active);
        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(move || run_loop(receiver, loop_active))?;
        let thread_id = thread.thread().id();
        log::debug!("Tick scheduler thread started");

        Ok(Self {
            sender,
            next_id: AtomicU64::new(1),
            active,
            thread: Mutex::new(Some(thread)),
            thread_id,
        })
    }

    /// Tasks currently scheduled.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl PeriodicScheduler for TickScheduler {
    fn schedule(
        &self,
        interval: Duration,
        task: TickTask,
    ) -> Result<Box<dyn ScheduledTick>, FrameTapError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let interval = interval.max(Duration::from_micros(100));
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = Entry {
            id,
            interval,
            deadline: Instant::now() + interval,
            task,
            cancelled: Arc::clone(&cancelled),
        };

        self.sender
            .send(Control::Schedule(entry))
            .map_err(|_| FrameTapError::Scheduler("tick thread has shut down".to_string()))?;
        log::debug!("Scheduled tick task {id} every {interval:?}");

        Ok(Box::new(ThreadTick {
            id,
            cancelled,
            sender: self.sender.clone(),
        }))
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        let _ = self.sender.send(Control::Shutdown);
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                log::error!("Tick scheduler thread panicked during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

struct ThreadTick {
    id: u64,
    cancelled: Arc<AtomicBool>,
    sender: Sender<Control>,
}

impl ScheduledTick for ThreadTick {
    fn cancel(self: Box<Self>) {
        self.cancelled.store(true, Ordering::Release);
        // The loop also skips flagged entries, so a closed channel is harmless.
        let _ = self.sender.send(Control::Cancel(self.id));
        log::debug!("Cancelled tick task {}", self.id);
    }
}

fn run_loop(receiver: Receiver<Control>, active: Arc<AtomicUsize>) {
    let mut entries: Vec<Entry> = Vec::new();

    loop {
        let next_deadline = entries.iter().map(|entry| entry.deadline).min();
        let message = match next_deadline {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };

        match message {
            Some(Control::Schedule(entry)) => entries.push(entry),
            Some(Control::Cancel(id)) => entries.retain(|entry| entry.id != id),
            Some(Control::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        for entry in entries.iter_mut().filter(|entry| entry.deadline <= now) {
            if entry.cancelled.load(Ordering::Acquire) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| (entry.task)())).is_err() {
                log::error!("Tick task {} panicked; it stays scheduled", entry.id);
            }
            entry.deadline += entry.interval;
            let after = Instant::now();
            if entry.deadline <= after {
                // Coalesce missed ticks instead of replaying them.
                entry.deadline = after + entry.interval;
            }
        }

        entries.retain(|entry| !entry.cancelled.load(Ordering::Acquire));
        active.store(entries.len(), Ordering::Release);
    }

    active.store(0, Ordering::Release);
    log::debug!("Tick scheduler thread stopped ({} task(s) dropped)", entries.len());
}

type ManualTasks = Mutex<Vec<(u64, TickTask)>>;

/// A scheduler the host drives by calling [`fire`](Self::fire).
///
/// The interval passed to [`schedule`](PeriodicScheduler::schedule) is
/// ignored: every call to `fire` runs every scheduled task once.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Arc<ManualTasks>,
    next_id: AtomicU64,
}

impl ManualScheduler {
    /// A scheduler with no tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every scheduled task once, in scheduling order.
    ///
    /// Returns the number of tasks run. Tasks run without the scheduler's
    /// lock held, so they may schedule or cancel.
    pub fn fire(&self) -> usize {
        let tasks: Vec<TickTask> = self
            .tasks
            .lock()
            .iter()
            .map(|(_, task)| Arc::clone(task))
            .collect();
        for task in &tasks {
            task();
        }
        tasks.len()
    }

    /// Tasks currently scheduled.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no task is scheduled.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl PeriodicScheduler for ManualScheduler {
    fn schedule(
        &self,
        _interval: Duration,
        task: TickTask,
    ) -> Result<Box<dyn ScheduledTick>, FrameTapError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().push((id, task));
        Ok(Box::new(ManualTick {
            id,
            tasks: Arc::downgrade(&self.tasks),
        }))
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("tasks", &self.len())
            .finish()
    }
}

struct ManualTick {
    id: u64,
    tasks: Weak<ManualTasks>,
}

impl ScheduledTick for ManualTick {
    fn cancel(self: Box<Self>) {
        if let Some(tasks) = self.tasks.upgrade() {
            tasks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
