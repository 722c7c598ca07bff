//! loopwire - event-loop resources as push streams
//!
//! # Architecture
//!
//! ```text
//! Resource (timer, reader, socket, countdown)
//! → owned by Context (attach / detach)
//! → emits into Source (weak back-reference)
//! → Source terminal signal detaches the Resource
//! ```
//!
//! ## Core Principles
//!
//! - Ownership flows one way: Context → Resource
//! - Resource callbacks only hold weak handles to streams and contexts
//! - Exactly one terminal signal per stream; it is the only cancellation
//! - Configuration errors are returned at call time, resource errors fail the stream
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/      # Address, Packet, Deferred
//! ├── stream/      # Source, Sink, Subscription
//! ├── context/     # Context, Resource trait, resource bridge
//! ├── resource/    # Task, Stepper, Timer, Countdown
//! ├── adapter/     # Byte streams, stdin, sequences, directories
//! ├── transport/   # UDP client and server
//! └── timeout.rs   # Idle timeout combinator
//! ```

// Core types
pub mod common;
pub mod error;
pub mod stream;

// Resource ownership
pub mod context;
pub mod resource;

// Producers and combinators
pub mod adapter;
mod timeout;
pub mod transport;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::{Address, Deferred, Packet};
pub use config::Config;
pub use error::{Error, Result, SharedError};

pub use adapter::{ByteStream, DirectoryOptions, IntoSource, Sequence, Stdin};
pub use context::{Context, Resource, ResourceId, WeakContext};
pub use resource::{ReschedulePolicy, Tick, TimerConfig};
pub use stream::{Outcome, Sink, Source, Subscription, WeakSource};
pub use transport::{Client, Server, UdpOptions};
