//! Idle timeout between an input source and an output sink

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::{Context, ResourceId};
use crate::error::Error;
use crate::resource::Countdown;
use crate::stream::{Sink, Source};

impl Context {
    /// Forward `input` into `output`, failing `output` with
    /// [`Error::Timeout`] whenever `delay` passes without an input item.
    ///
    /// Every input item re-arms the deadline. The input's own finish or
    /// failure is passed on to `output`. Forwarding stops, and the countdown
    /// is detached, as soon as `output` terminates for any reason.
    pub fn timeout<T>(
        &self,
        label: &str,
        input: &Source<T>,
        output: &Sink<T>,
        delay: Duration,
    ) -> ResourceId
    where
        T: Clone + Send + 'static,
    {
        let label = self.child_label(label);
        let weak_output = output.feed().downgrade();

        let countdown = Arc::new(Countdown::start(self, delay, {
            let weak_output = weak_output.clone();
            let label = label.clone();
            move || {
                if let Some(output) = weak_output.upgrade() {
                    debug!("[{}] Idle for {:?}, failing {}", label, delay, output.label());
                    output.fail(Error::Timeout(delay));
                }
            }
        }));

        let mut items = input.subscribe();
        let weak_countdown = Arc::downgrade(&countdown);
        let forward = self.spawn(async move {
            while let Some(event) = items.next().await {
                let Some(output) = weak_output.upgrade() else { return };
                if output.is_terminal() {
                    return;
                }
                match event {
                    Ok(item) => {
                        if let Some(countdown) = weak_countdown.upgrade() {
                            countdown.reset();
                        }
                        output.emit(item);
                    }
                    Err(e) => {
                        debug!("[{}] Input failed: {}", label, e);
                        output.fail(e);
                        return;
                    }
                }
            }
            if let Some(output) = weak_output.upgrade() {
                output.finish();
            }
        });
        countdown.push_task(forward.abort_handle());

        self.bind(countdown, output.feed())
    }
}
