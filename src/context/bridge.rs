//! Resource bridge - ties a child resource's lifetime to a stream
//!
//! The context keeps the only strong reference to the resource. The stream
//! gets a one-shot completion callback holding a weak context handle and the
//! resource id, so whichever side ends first, the resource is detached exactly
//! once and nothing keeps the other alive.

use std::sync::Arc;

use super::{Context, Resource, ResourceId};
use crate::stream::Source;

impl Context {
    /// Attach `resource` and detach it (stop + remove) when `stream`
    /// terminates. If `stream` is already terminal the resource is detached
    /// before this returns.
    pub fn bind<T>(&self, resource: Arc<dyn Resource>, stream: &Source<T>) -> ResourceId
    where
        T: Clone + Send + 'static,
    {
        self.bind_with(resource, stream, |ctx, id| {
            // A dropped context already stopped its children.
            if let Some(ctx) = ctx {
                ctx.detach(id);
            }
        })
    }

    /// Like [`Context::bind`] with a custom detach action. `on_detach` gets
    /// the context if it is still alive, and must tolerate the resource
    /// having been detached already.
    pub fn bind_with<T, F>(
        &self,
        resource: Arc<dyn Resource>,
        stream: &Source<T>,
        on_detach: F,
    ) -> ResourceId
    where
        T: Clone + Send + 'static,
        F: FnOnce(Option<Context>, ResourceId) + Send + 'static,
    {
        let id = self.add_child(resource);
        let weak = self.downgrade();
        stream.on_complete(move |_| on_detach(weak.upgrade(), id));
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::context::tests::StopCounter;
    use crate::error::Error;

    #[tokio::test]
    async fn test_finish_detaches_once() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.source::<u8>("s");
        let counter = Arc::new(StopCounter::default());
        let id = ctx.bind(counter.clone(), &source);

        assert!(ctx.contains(id));
        source.finish();
        assert!(!ctx.contains(id));
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);

        // Later detaches are no-ops
        assert!(!ctx.detach(id));
        source.finish();
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_detaches() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.source::<u8>("s");
        let counter = Arc::new(StopCounter::default());
        let id = ctx.bind(counter.clone(), &source);

        source.fail(Error::Config("bad".into()));
        assert!(!ctx.contains(id));
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bind_to_terminal_stream_detaches_immediately() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.source::<u8>("s");
        source.finish();

        let counter = Arc::new(StopCounter::default());
        let id = ctx.bind(counter.clone(), &source);
        assert!(!ctx.contains(id));
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_detach_then_finish() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.source::<u8>("s");
        let counter = Arc::new(StopCounter::default());
        let id = ctx.bind(counter.clone(), &source);

        assert!(ctx.detach(id));
        source.finish();
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_does_not_keep_context_alive() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.source::<u8>("s");
        let counter = Arc::new(StopCounter::default());
        ctx.bind(counter.clone(), &source);
        let weak = ctx.downgrade();

        drop(ctx);
        assert!(weak.upgrade().is_none());
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);

        // The callback finds no context and does nothing
        source.finish();
        assert_eq!(counter.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_detach_action() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.source::<u8>("s");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let id = ctx.bind_with(Arc::new(StopCounter::default()), &source, move |ctx, id| {
            counter.fetch_add(1, Ordering::SeqCst);
            ctx.unwrap().remove_child(id);
        });
        source.finish();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!ctx.contains(id));
    }
}
