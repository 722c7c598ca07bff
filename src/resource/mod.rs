//! Resources
//!
//! Event-loop entities owned by a [`crate::Context`]:
//! - TaskResource: spawned tasks, aborted on stop
//! - Stepper: one-item-per-step drain of a pull input
//! - Countdown: resettable deadline
//! - Timer: periodic ticks into a Source

mod countdown;
pub(crate) mod stepper;
mod task;
mod timer;

pub use countdown::Countdown;
pub use task::TaskResource;
pub use timer::{ReschedulePolicy, Tick, TimerConfig};
