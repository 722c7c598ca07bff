//! In-memory sequence adapter

use super::IntoSource;
use crate::context::Context;
use crate::error::Result;
use crate::resource::stepper::{Step, Stepper};
use crate::stream::Source;

/// Any iterator, drained one item per scheduling step
pub struct Sequence<I>(pub I);

impl<I> Step for Sequence<I>
where
    I: Iterator + Send + 'static,
    I::Item: Clone + Send + 'static,
{
    type Item = I::Item;

    fn next_item(&mut self) -> Option<I::Item> {
        self.0.next()
    }
}

impl<I> IntoSource<I::Item> for Sequence<I>
where
    I: Iterator + Send + 'static,
    I::Item: Clone + Send + 'static,
{
    fn into_source(self, ctx: &Context, label: &str) -> Result<Source<I::Item>> {
        let source = ctx.source(label);
        Stepper::start(ctx, "sequence", self, &source);
        Ok(source)
    }
}

impl<T> IntoSource<T> for Vec<T>
where
    T: Clone + Send + 'static,
{
    fn into_source(self, ctx: &Context, label: &str) -> Result<Source<T>> {
        Sequence(self.into_iter()).into_source(ctx, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_items_in_order_then_finish() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.from("abc", vec!['a', 'b', 'c']).unwrap();
        let mut sub = source.subscribe();

        let mut seen = Vec::new();
        while let Some(item) = sub.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, vec!['a', 'b', 'c']);
        assert!(source.completion().await.is_ok());
        assert_eq!(ctx.child_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_emitted_synchronously() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.from("lazy", vec![1, 2, 3]).unwrap();

        // No scheduling step has run yet
        assert!(!source.is_terminal());
        let mut sub = source.subscribe();
        assert!(futures_util::FutureExt::now_or_never(sub.next()).is_none());

        assert_eq!(sub.next().await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_item_per_step() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.from("steps", Sequence(0..1000)).unwrap();
        let mut sub = source.subscribe();

        tokio::task::yield_now().await;
        // A single yield cannot have drained the whole range
        assert!(!source.is_terminal());

        let mut count = 0;
        while let Some(item) = sub.next().await {
            assert_eq!(item.unwrap(), count);
            count += 1;
        }
        assert_eq!(count, 1000);
    }

    #[tokio::test]
    async fn test_empty_sequence_finishes() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.from("empty", Vec::<u8>::new()).unwrap();
        assert!(source.completion().await.is_ok());
        assert_eq!(ctx.child_count(), 0);
    }

    #[tokio::test]
    async fn test_finishing_early_stops_stepping() {
        let ctx = Context::new("ctx").unwrap();
        let source = ctx.from("early", Sequence(0..u64::MAX)).unwrap();
        let mut sub = source.subscribe();

        assert_eq!(sub.next().await.unwrap().unwrap(), 0);
        source.finish();
        assert_eq!(ctx.child_count(), 0);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // Whatever was emitted before finish, nothing came after it
        while let Some(item) = sub.next().await {
            item.unwrap();
        }
    }
}
