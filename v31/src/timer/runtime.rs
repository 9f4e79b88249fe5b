use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
    time::Duration,
};

use tokio::{task::JoinHandle, time::sleep};

use super::{Scheduler, Task, TaskId};

/// Scheduler backed by the tokio timer.
///
/// Tasks are spawned with `spawn_local`, so it must be used from inside a
/// `tokio::task::LocalSet`.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: Cell<u64>,
    handles: Rc<RefCell<HashMap<TaskId, JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.handles.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn Task>) -> TaskId {
        let id = TaskId::new(self.next_id.get() + 1);
        self.next_id.set(self.next_id.get() + 1);

        let handles = self.handles.clone();
        let handle = tokio::task::spawn_local(async move {
            sleep(delay).await;
            handles.borrow_mut().remove(&id);
            task.fire();
        });
        self.handles.borrow_mut().insert(id, handle);
        id
    }

    fn cancel(&self, id: TaskId) {
        if let Some(handle) = self.handles.borrow_mut().remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.handles.borrow_mut().drain() {
            handle.abort();
        }
    }
}
