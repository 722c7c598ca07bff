//! Push streams
//!
//! - Source: emits items, then exactly one finish or fail
//! - Sink: accepts items and republishes them on its feed Source
//! - Subscription: pull side of a Source, a `futures` Stream

mod sink;
mod source;
mod subscription;

pub use sink::Sink;
pub use source::{Outcome, Source, WeakSource};
pub use subscription::Subscription;
