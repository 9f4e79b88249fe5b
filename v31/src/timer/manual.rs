use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use super::{Scheduler, Task, TaskId};

/// Scheduler driven by a virtual clock.
///
/// Nothing runs until [`ManualScheduler::advance`] moves the clock. Tasks
/// due at the same instant run in the order they were scheduled.
#[derive(Default)]
pub struct ManualScheduler {
    inner: RefCell<Inner>,
}

#[derive(Default)]
struct Inner {
    now: Duration,
    next_id: u64,
    tasks: BTreeMap<(Duration, TaskId), Box<dyn Task>>,
    deadlines: HashMap<TaskId, Duration>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner
            .borrow()
            .tasks
            .keys()
            .next()
            .map(|(deadline, _)| *deadline)
    }

    /// Moves the clock forward, running every task that falls due on the
    /// way. Tasks scheduled while advancing run too when their deadline is
    /// within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        while let Some(task) = self.pop_due(target) {
            task.fire();
        }
        self.inner.borrow_mut().now = target;
    }

    fn pop_due(&self, target: Duration) -> Option<Box<dyn Task>> {
        let mut inner = self.inner.borrow_mut();
        let key = *inner.tasks.keys().next()?;
        if key.0 > target {
            return None;
        }
        inner.now = key.0;
        inner.deadlines.remove(&key.1);
        inner.tasks.remove(&key)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn Task>) -> TaskId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = TaskId::new(inner.next_id);
        let deadline = inner.now + delay;
        inner.tasks.insert((deadline, id), task);
        inner.deadlines.insert(id, deadline);
        id
    }

    fn cancel(&self, id: TaskId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(deadline) = inner.deadlines.remove(&id) {
            inner.tasks.remove(&(deadline, id));
        }
    }
}
