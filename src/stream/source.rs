//! Source - push-based item stream with a single terminal signal

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use super::subscription::{Event, Subscription};
use crate::common::{deferred, Deferred, Resolver};
use crate::error::{Error, SharedError};

/// How a stream ended: `Ok(())` for finish, `Err` for fail
pub type Outcome = std::result::Result<(), SharedError>;

type CompletionCallback = Box<dyn FnOnce(&Outcome) + Send>;

/// A push stream of `T`.
///
/// Handles are cheap to clone and share one underlying stream. Items are
/// delivered to every live subscriber in emission order. Emission is fire and
/// forget: an item emitted while nobody is subscribed is dropped. Exactly one
/// terminal signal (finish or fail) is accepted and every subscriber, early
/// or late, observes it.
pub struct Source<T> {
    inner: Arc<Inner<T>>,
}

/// Non-owning handle to a [`Source`], held by resource callbacks so that a
/// running resource never keeps its stream alive.
pub struct WeakSource<T> {
    inner: Weak<Inner<T>>,
}

struct Inner<T> {
    label: String,
    state: Mutex<State<T>>,
    resolver: Resolver<Outcome>,
    completion: Deferred<Outcome>,
}

struct State<T> {
    terminal: Option<Outcome>,
    subscribers: Vec<mpsc::UnboundedSender<Event<T>>>,
    on_complete: Vec<CompletionCallback>,
}

impl<T> State<T>
where
    T: Clone,
{
    fn deliver(&mut self, event: Event<T>) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

impl<T> Source<T>
where
    T: Clone + Send + 'static,
{
    /// Create an open stream. Prefer [`crate::Context::source`], which
    /// scopes the label under the owning context.
    pub fn new(label: impl Into<String>) -> Self {
        let (resolver, completion) = deferred();
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                state: Mutex::new(State {
                    terminal: None,
                    subscribers: Vec::new(),
                    on_complete: Vec::new(),
                }),
                resolver,
                completion,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Push an item to the current subscribers. Returns `false` (and drops
    /// the item) if the stream has already terminated.
    pub fn emit(&self, item: T) -> bool {
        let mut state = self.inner.state.lock();
        if state.terminal.is_some() {
            trace!("[{}] Dropping item emitted after termination", self.inner.label);
            return false;
        }
        if state.subscribers.is_empty() {
            trace!("[{}] No subscribers, item dropped", self.inner.label);
            return true;
        }
        state.deliver(Event::Item(item));
        true
    }

    /// Terminate successfully. Returns `false` if already terminal.
    pub fn finish(&self) -> bool {
        self.terminate(Ok(()))
    }

    /// Terminate with an error. Returns `false` if already terminal.
    pub fn fail(&self, error: impl Into<SharedError>) -> bool {
        self.terminate(Err(error.into()))
    }

    fn terminate(&self, outcome: Outcome) -> bool {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(outcome.clone());
            let event = match &outcome {
                Ok(()) => Event::Finish,
                Err(e) => Event::Fail(e.clone()),
            };
            state.deliver(event);
            // Receivers drain what they were sent, then end.
            state.subscribers.clear();
            std::mem::take(&mut state.on_complete)
        };

        match &outcome {
            Ok(()) => trace!("[{}] Finished", self.inner.label),
            Err(e) => trace!("[{}] Failed: {}", self.inner.label, e),
        }

        self.inner.resolver.resolve(outcome.clone());
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.state.lock().terminal.is_some()
    }

    /// The terminal signal, if one has been received
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.lock().terminal.clone()
    }

    /// Resolves with the terminal signal. The returned future does not keep
    /// the stream alive; if every handle is dropped first it resolves with
    /// [`Error::Abandoned`].
    pub fn completion(&self) -> impl Future<Output = Outcome> + Send + 'static {
        let completion = self.inner.completion.clone();
        let label = self.inner.label.clone();
        async move {
            completion
                .wait()
                .await
                .unwrap_or_else(|| Err(Arc::new(Error::Abandoned(label))))
        }
    }

    /// Register a one-shot callback for the terminal signal. It runs inside
    /// the `finish`/`fail` call that terminates the stream, after the
    /// completion future has resolved, or immediately if the stream is
    /// already terminal.
    pub fn on_complete(&self, callback: impl FnOnce(&Outcome) + Send + 'static) {
        let mut state = self.inner.state.lock();
        match state.terminal.clone() {
            Some(outcome) => {
                drop(state);
                callback(&outcome);
            }
            None => state.on_complete.push(Box::new(callback)),
        }
    }

    /// Start receiving items emitted from now on. A subscriber arriving after
    /// termination receives only the terminal signal.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.state.lock();

        match state.terminal.clone() {
            None => state.subscribers.push(tx),
            Some(Ok(())) => {
                let _ = tx.send(Event::Finish);
            }
            Some(Err(e)) => {
                let _ = tx.send(Event::Fail(e));
            }
        }

        Subscription::new(rx)
    }

    pub fn downgrade(&self) -> WeakSource<T> {
        WeakSource {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> WeakSource<T> {
    pub fn upgrade(&self) -> Option<Source<T>> {
        self.inner.upgrade().map(|inner| Source { inner })
    }
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("label", &self.inner.label)
            .field("terminal", &self.inner.state.lock().terminal)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // A stream dropped while open still owes its bound resources a
        // detach; the completion future observes the dropped resolver.
        let state = self.state.get_mut();
        if state.terminal.is_some() {
            return;
        }
        let outcome: Outcome = Err(Arc::new(Error::Abandoned(self.label.clone())));
        for callback in std::mem::take(&mut state.on_complete) {
            callback(&outcome);
        }
    }
}
