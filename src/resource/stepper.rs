//! Stepper - emits one item per scheduling step
//!
//! Pull-style in-memory inputs (sequences, collected vectors) are drained as
//! an explicit state machine: each step is a deferred callback that takes one
//! item, emits it, and schedules the next step. Nothing is emitted
//! synchronously and a large input never monopolizes the event loop.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::trace;

use crate::context::{self, Context, Resource};
use crate::stream::{Source, WeakSource};

/// A pull input the stepper drains
pub(crate) trait Step: Send + 'static {
    type Item: Clone + Send + 'static;

    /// `None` when exhausted
    fn next_item(&mut self) -> Option<Self::Item>;
}

pub(crate) struct Stepper<S: Step> {
    kind: &'static str,
    runtime: Handle,
    source: WeakSource<S::Item>,
    /// `None` once exhausted or stopped; dropping it releases the input
    state: Mutex<Option<S>>,
}

impl<S: Step> Stepper<S> {
    /// Bind a stepper over `input` to `source` and schedule its first step
    pub(crate) fn start(ctx: &Context, kind: &'static str, input: S, source: &Source<S::Item>) {
        let stepper = Arc::new(Self {
            kind,
            runtime: ctx.runtime().clone(),
            source: source.downgrade(),
            state: Mutex::new(Some(input)),
        });
        ctx.bind(stepper.clone(), source);
        stepper.schedule();
    }

    fn schedule(self: Arc<Self>) {
        let runtime = self.runtime.clone();
        context::later(&runtime, move || self.step());
    }

    fn step(self: Arc<Self>) {
        let Some(source) = self.source.upgrade() else {
            self.stop();
            return;
        };

        // The lock must be released before emitting: a terminal signal
        // detaches and stops this stepper.
        let next = match self.state.lock().as_mut() {
            Some(input) => input.next_item(),
            None => return,
        };

        match next {
            Some(item) => {
                if source.emit(item) {
                    self.schedule();
                }
            }
            None => {
                trace!("[{}] {} exhausted", source.label(), self.kind);
                self.stop();
                source.finish();
            }
        }
    }
}

impl<S: Step> Resource for Stepper<S> {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn stop(&self) {
        self.state.lock().take();
    }
}
