//! Subscription - the receiving end of a Source

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::SharedError;

#[derive(Debug, Clone)]
pub(crate) enum Event<T> {
    Item(T),
    Finish,
    Fail(SharedError),
}

/// Items of one [`super::Source`], in emission order.
///
/// Yields `Ok(item)` per item; a failure is yielded once as `Err` and ends
/// the stream; a finish simply ends it. Combinators come from
/// [`futures_util::StreamExt`].
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Event<T>>,
    done: bool,
}

impl<T> Subscription<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Event<T>>) -> Self {
        Self { rx, done: false }
    }

    /// Next item, `Some(Err)` on failure, `None` once the source is finished
    pub async fn next(&mut self) -> Option<Result<T, SharedError>> {
        StreamExt::next(self).await
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, SharedError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Event::Item(item))) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(Some(Event::Fail(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Some(Event::Finish)) | Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
