//! Stream-from-resource adapters
//!
//! Every supported input shape implements [`IntoSource`]; [`Context::from`]
//! picks the adapter from the input's type at the call site:
//!
//! ```text
//! ByteStream<R> / Stdin      → Source<Bytes>     (one item per read)
//! Vec<T> / Sequence<I>       → Source<T>         (one item per step)
//! DirectoryOptions           → Source<OsString>  (one entry per step)
//! ```
//!
//! Shapes that are not supported do not compile; invalid options are
//! rejected with `Err` before any resource is created.

mod directory;
mod reader;
mod sequence;

pub use directory::DirectoryOptions;
pub use reader::{ByteStream, Stdin, DEFAULT_CHUNK_SIZE};
pub use sequence::Sequence;

use crate::context::Context;
use crate::error::Result;
use crate::stream::Source;

/// An input that can be turned into a push source owned by a context
pub trait IntoSource<T> {
    fn into_source(self, ctx: &Context, label: &str) -> Result<Source<T>>;
}

impl Context {
    /// Build a source from `input`, attaching whatever resource drives it
    pub fn from<T, I>(&self, label: &str, input: I) -> Result<Source<T>>
    where
        I: IntoSource<T>,
    {
        input.into_source(self, label)
    }
}
