//! Spawned-task resources

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::context::Resource;

/// A resource backed by one or more spawned tasks. Stopping aborts them.
pub struct TaskResource {
    kind: &'static str,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl TaskResource {
    pub fn with_task(kind: &'static str, task: AbortHandle) -> Self {
        Self {
            kind,
            tasks: Mutex::new(vec![task]),
        }
    }

    pub fn push(&self, task: AbortHandle) {
        self.tasks.lock().push(task);
    }
}

impl Resource for TaskResource {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
