//! Byte-stream adapter: AsyncRead resources and standard input

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, trace};

use super::IntoSource;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::resource::TaskResource;
use crate::stream::Source;

/// Read buffer reserved before each read (32KB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// A readable byte stream to be pushed chunk by chunk.
///
/// Each completed read becomes one `Bytes` item, end of input finishes the
/// source and a read error fails it.
pub struct ByteStream<R> {
    reader: R,
    chunk_size: usize,
    attach: bool,
}

impl<R> ByteStream<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
            attach: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// The reader already has an owner: the reading task is not attached to
    /// the context and is not detached when the source completes. It stops
    /// on its own at end of input or at the first item the source refuses.
    pub fn owned_elsewhere(mut self) -> Self {
        self.attach = false;
        self
    }
}

/// The process's standard input
#[derive(Debug, Clone, Copy, Default)]
pub struct Stdin;

impl<R> IntoSource<Bytes> for ByteStream<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn into_source(self, ctx: &Context, label: &str) -> Result<Source<Bytes>> {
        if self.chunk_size == 0 {
            return Err(Error::Config(format!("reader [{}] needs a non-zero chunk size", label)));
        }

        let source = ctx.source(label);
        let weak = source.downgrade();
        let ByteStream {
            mut reader,
            chunk_size,
            attach,
        } = self;

        let task = ctx.spawn(async move {
            let mut buf = BytesMut::with_capacity(chunk_size);
            loop {
                buf.reserve(chunk_size);
                let read = reader.read_buf(&mut buf).await;
                let Some(source) = weak.upgrade() else { break };
                match read {
                    Ok(0) => {
                        debug!("[{}] End of input", source.label());
                        source.finish();
                        break;
                    }
                    Ok(n) => {
                        trace!("[{}] Read {} bytes", source.label(), n);
                        if !source.emit(buf.split().freeze()) {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("[{}] Read error: {}", source.label(), e);
                        source.fail(Error::Io(e));
                        break;
                    }
                }
            }
        });

        if attach {
            ctx.bind(
                Arc::new(TaskResource::with_task("reader", task.abort_handle())),
                &source,
            );
        }
        Ok(source)
    }
}

impl IntoSource<Bytes> for Stdin {
    fn into_source(self, ctx: &Context, label: &str) -> Result<Source<Bytes>> {
        ByteStream::new(tokio::io::stdin()).into_source(ctx, label)
    }
}
