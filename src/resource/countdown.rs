//! Countdown - a resettable one-shot deadline

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};

use super::TaskResource;
use crate::context::{Context, Resource};

/// Fires its expiry action once `delay` passes without a [`Countdown::reset`].
///
/// Stopping (or dropping) the countdown disarms it.
pub struct Countdown {
    delay: Duration,
    deadline: watch::Sender<Instant>,
    tasks: TaskResource,
}

impl Countdown {
    /// Arm a countdown on `ctx`'s runtime. The caller is responsible for
    /// attaching it, usually through [`Context::bind`].
    pub fn start(ctx: &Context, delay: Duration, on_expire: impl FnOnce() + Send + 'static) -> Self {
        let (deadline, mut rx) = watch::channel(Instant::now() + delay);

        let task = ctx.spawn(async move {
            loop {
                let at = *rx.borrow_and_update();
                tokio::select! {
                    _ = time::sleep_until(at) => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
            on_expire();
        });

        Self {
            delay,
            deadline,
            tasks: TaskResource::with_task("countdown", task.abort_handle()),
        }
    }

    /// Push the deadline back to `delay` from now
    pub fn reset(&self) {
        self.deadline.send_replace(Instant::now() + self.delay);
    }

    /// Tie another task's lifetime to this countdown
    pub fn push_task(&self, task: AbortHandle) {
        self.tasks.push(task);
    }
}

impl Resource for Countdown {
    fn kind(&self) -> &'static str {
        "countdown"
    }

    fn stop(&self) {
        self.tasks.stop();
    }
}
