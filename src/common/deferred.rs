//! Deferred - a value that is set once and awaited by any number of readers
//!
//! Used for stream completion, connection establishment and bound ports.

use tokio::sync::watch;

/// Write side of a [`Deferred`]. Only the first `resolve` takes effect.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: watch::Sender<Option<T>>,
}

/// Read side of a once-set value. Cloning is cheap; every clone observes the
/// same value.
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    rx: watch::Receiver<Option<T>>,
}

/// Create a connected resolver/deferred pair
pub fn deferred<T>() -> (Resolver<T>, Deferred<T>) {
    let (tx, rx) = watch::channel(None);
    (Resolver { tx }, Deferred { rx })
}

impl<T> Resolver<T> {
    /// Set the value. Returns `false` if it was already set.
    pub fn resolve(&self, value: T) -> bool {
        let mut value = Some(value);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        })
    }
}

impl<T: Clone> Deferred<T> {
    /// Current value, if already set
    pub fn peek(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the value. Returns `None` if the resolver was dropped without
    /// ever resolving.
    pub async fn wait(&self) -> Option<T> {
        let mut rx = self.rx.clone();
        let value = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_resolve_wins() {
        let (resolver, value) = deferred();
        assert!(value.peek().is_none());
        assert!(resolver.resolve(1u16));
        assert!(!resolver.resolve(2u16));
        assert_eq!(value.wait().await, Some(1));
        assert_eq!(value.clone().peek(), Some(1));
    }

    #[tokio::test]
    async fn test_dropped_resolver_yields_none() {
        let (resolver, value) = deferred::<u16>();
        let waiter = tokio::spawn({
            let value = value.clone();
            async move { value.wait().await }
        });
        drop(resolver);
        assert_eq!(waiter.await.unwrap(), None);
    }
}
