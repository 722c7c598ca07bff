//! Common types and abstractions
//!
//! - Address: datagram endpoint representation and resolution
//! - Packet: payload plus peer address
//! - Deferred: once-set value awaited by many readers
//! - Error: unified error types

mod address;
mod deferred;
mod packet;

pub use address::{Address, UDP_SCHEME, WILDCARD_HOST};
pub use deferred::{deferred, Deferred, Resolver};
pub use packet::Packet;

// Re-export error types from crate root
pub use crate::error::{Error, Result, SharedError};
