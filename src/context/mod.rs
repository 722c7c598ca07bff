//! Context - owner of event-loop resources
//!
//! A context is the single parent of every resource it spawns. Ownership only
//! flows one way:
//!
//! ```text
//! Context ──owns──> Resource (timer, socket, reader, countdown)
//!    ^                  │
//!    └──── weak ────────┤  (callbacks)
//! Source <──── weak ────┘
//! ```
//!
//! Streams never own resources; a stream's terminal signal is what detaches
//! them (see [`Context::bind`]). Dropping the context stops every child.

mod bridge;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::stream::{Sink, Source};

/// Identifies a child resource within its context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event-loop-managed entity with a start/stop lifecycle.
///
/// `stop` must be idempotent and safe to call on a resource that never
/// fully started.
pub trait Resource: Send + Sync {
    /// Short name for diagnostics, e.g. "timer" or "udp-server"
    fn kind(&self) -> &'static str;

    fn stop(&self);
}

/// Owning aggregate for resources; cheap to clone.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// Non-owning handle to a [`Context`]
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

struct ContextInner {
    label: String,
    runtime: Handle,
    children: Mutex<HashMap<ResourceId, Arc<dyn Resource>>>,
    next_id: AtomicU64,
}

impl Context {
    /// Create a context on the current tokio runtime
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(label, runtime))
    }

    /// Create a context that spawns its resources on `runtime`
    pub fn with_runtime(label: impl Into<String>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                label: label.into(),
                runtime,
                children: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Labeled stream endpoint scoped under this context
    pub fn source<T>(&self, label: &str) -> Source<T>
    where
        T: Clone + Send + 'static,
    {
        Source::new(self.child_label(label))
    }

    /// Labeled sink scoped under this context
    pub fn sink<T>(&self, label: &str) -> Sink<T>
    where
        T: Clone + Send + 'static,
    {
        Sink::new(self.child_label(label))
    }

    pub(crate) fn child_label(&self, label: &str) -> String {
        format!("{}/{}", self.inner.label, label)
    }

    /// Take ownership of `resource` as a child
    pub fn add_child(&self, resource: Arc<dyn Resource>) -> ResourceId {
        let id = ResourceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        trace!("[{}] Attaching {} {}", self.inner.label, resource.kind(), id);
        self.inner.children.lock().insert(id, resource);
        id
    }

    /// Release a child without stopping it. `None` if it was not attached.
    pub fn remove_child(&self, id: ResourceId) -> Option<Arc<dyn Resource>> {
        self.inner.children.lock().remove(&id)
    }

    /// Stop and remove a child. Returns `false` if it was already detached.
    pub fn detach(&self, id: ResourceId) -> bool {
        // Stop outside the registry lock; stopping may re-enter the context.
        let Some(resource) = self.remove_child(id) else {
            trace!("[{}] {} already detached", self.inner.label, id);
            return false;
        };
        debug!("[{}] Detaching {} {}", self.inner.label, resource.kind(), id);
        resource.stop();
        true
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.inner.children.lock().contains_key(&id)
    }

    /// Number of attached resources
    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    /// Run `callback` on a later scheduling step, never synchronously
    pub fn later(&self, callback: impl FnOnce() + Send + 'static) {
        later(&self.inner.runtime, callback);
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.runtime.spawn(future)
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("label", &self.inner.label)
            .field("children", &self.child_count())
            .finish()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let children = std::mem::take(self.children.get_mut());
        if !children.is_empty() {
            debug!("[{}] Stopping {} resources", self.label, children.len());
        }
        for resource in children.into_values() {
            resource.stop();
        }
    }
}

/// Defer `callback` by one scheduling step on `runtime`
pub(crate) fn later(runtime: &Handle, callback: impl FnOnce() + Send + 'static) {
    runtime.spawn(async move { callback() });
}
