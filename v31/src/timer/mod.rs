//! Keep-alive and request timers.
//!
//! Timers never call into the client directly. A [`Task`] is handed to a
//! [`Scheduler`] and fired later from the event loop, after every borrow of
//! the client state has been released.

use std::{fmt, rc::Rc, time::Duration};

pub use self::{manual::ManualScheduler, runtime::TokioScheduler};

mod manual;
mod runtime;

/// Keep-alive used when the connect options leave it unset.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Request timeout used when the options leave it unset or zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait Task {
    fn fire(self: Box<Self>);
}

/// A single threaded queue of cancellable delayed tasks.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn Task>) -> TaskId;

    /// Cancelling a task that already ran or was cancelled does nothing.
    fn cancel(&self, id: TaskId);
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule(&self, delay: Duration, task: Box<dyn Task>) -> TaskId {
        (**self).schedule(delay, task)
    }

    fn cancel(&self, id: TaskId) {
        (**self).cancel(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingAction {
    /// Traffic was seen during the interval, a PINGREQ is due.
    SendPing,
    TimedOut,
}

type TaskFactory = Box<dyn Fn() -> Box<dyn Task>>;

/// Watches the connection for traffic.
///
/// Each reset re-arms the timer for one keep-alive interval. When it fires
/// after a reset a PINGREQ is due and the timer is armed again without the
/// reset mark; firing a second time with no traffic in between is a
/// timeout.
pub struct Pinger {
    scheduler: Rc<dyn Scheduler>,
    keep_alive: Duration,
    make_task: TaskFactory,
    is_reset: bool,
    pending: Option<TaskId>,
}

impl Pinger {
    pub fn new<F>(scheduler: Rc<dyn Scheduler>, keep_alive: Duration, make_task: F) -> Self
    where
        F: Fn() -> Box<dyn Task> + 'static,
    {
        Self {
            scheduler,
            keep_alive,
            make_task: Box::new(make_task),
            is_reset: false,
            pending: None,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.is_reset = true;
        self.cancel();
        if !self.keep_alive.is_zero() {
            self.arm();
        }
    }

    /// Called when the armed task fires.
    pub fn expire(&mut self) -> PingAction {
        self.pending = None;
        if !self.is_reset {
            return PingAction::TimedOut;
        }
        self.is_reset = false;
        self.arm();
        PingAction::SendPing
    }

    pub fn cancel(&mut self) {
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel(id);
        }
    }

    fn arm(&mut self) {
        let task = (self.make_task)();
        self.pending = Some(self.scheduler.schedule(self.keep_alive, task));
    }
}

impl fmt::Debug for Pinger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pinger")
            .field("keep_alive", &self.keep_alive)
            .field("is_reset", &self.is_reset)
            .field("pending", &self.pending)
            .finish()
    }
}

/// One-shot timer bound to a single request. Dropping it cancels it.
pub struct Timeout {
    scheduler: Rc<dyn Scheduler>,
    pending: Option<TaskId>,
}

impl Timeout {
    pub fn start(
        scheduler: Rc<dyn Scheduler>,
        duration: Option<Duration>,
        task: Box<dyn Task>,
    ) -> Self {
        let duration = match duration {
            Some(duration) if !duration.is_zero() => duration,
            _ => DEFAULT_TIMEOUT,
        };
        let pending = Some(scheduler.schedule(duration, task));
        Self { scheduler, pending }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel(id);
        }
    }

    /// Marks the timer as fired so a later cancel is a no-op.
    pub fn expired(&mut self) {
        self.pending = None;
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("pending", &self.pending)
            .finish()
    }
}
