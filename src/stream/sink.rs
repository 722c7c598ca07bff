//! Sink - consumer endpoint that republishes what it receives

use std::future::Future;

use super::source::{Outcome, Source};
use crate::error::SharedError;

/// Where items are sent. Everything sent is re-emitted on the sink's feed
/// [`Source`], which is how a transport or a second stage reacts to it.
pub struct Sink<T> {
    feed: Source<T>,
}

impl<T> Sink<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            feed: Source::new(label),
        }
    }

    pub fn label(&self) -> &str {
        self.feed.label()
    }

    /// Send an item. Returns `false` if the sink has already terminated.
    pub fn send(&self, item: T) -> bool {
        self.feed.emit(item)
    }

    pub fn finish(&self) -> bool {
        self.feed.finish()
    }

    pub fn fail(&self, error: impl Into<SharedError>) -> bool {
        self.feed.fail(error)
    }

    /// The stream of items sent into this sink
    pub fn feed(&self) -> &Source<T> {
        &self.feed
    }

    pub fn is_terminal(&self) -> bool {
        self.feed.is_terminal()
    }

    pub fn completion(&self) -> impl Future<Output = Outcome> + Send + 'static {
        self.feed.completion()
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink").field("feed", &self.feed).finish()
    }
}
