//! Directory listing adapter

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{fs, task};
use tracing::{debug, error, trace};

use super::IntoSource;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::resource::TaskResource;
use crate::stream::Source;

/// Which directory to enumerate. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryOptions {
    pub path: PathBuf,
}

impl DirectoryOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse options from JSON, e.g. `{"path": "/var/log"}`
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid directory options: {}", e)))
    }
}

impl IntoSource<OsString> for DirectoryOptions {
    /// The path is checked here, so a missing path or a non-directory is an
    /// `Err` from this call rather than a failed source. Entries are then
    /// read through `tokio::fs`, one per scheduling step.
    fn into_source(self, ctx: &Context, label: &str) -> Result<Source<OsString>> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Config(format!("directory [{}] needs a path", label)));
        }
        if !std::fs::metadata(&self.path)?.is_dir() {
            return Err(Error::Config(format!(
                "directory [{}]: {} is not a directory",
                label,
                self.path.display()
            )));
        }

        let source = ctx.source(label);
        let weak = source.downgrade();
        let path = self.path;
        debug!("[{}] Listing {}", source.label(), path.display());

        let task = ctx.spawn(async move {
            let mut entries = match fs::read_dir(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    if let Some(source) = weak.upgrade() {
                        error!("[{}] Failed to open {}: {}", source.label(), path.display(), e);
                        source.fail(Error::Io(e));
                    }
                    return;
                }
            };
            loop {
                task::yield_now().await;
                let next = entries.next_entry().await;
                let Some(source) = weak.upgrade() else { break };
                match next {
                    Ok(Some(entry)) => {
                        let name = entry.file_name();
                        if name == "." || name == ".." {
                            continue;
                        }
                        if !source.emit(name) {
                            break;
                        }
                    }
                    Ok(None) => {
                        trace!("[{}] Listing exhausted", source.label());
                        source.finish();
                        break;
                    }
                    Err(e) => {
                        error!("[{}] Reading {} failed: {}", source.label(), path.display(), e);
                        source.fail(Error::Io(e));
                        break;
                    }
                }
            }
        });

        ctx.bind(
            Arc::new(TaskResource::with_task("directory", task.abort_handle())),
            &source,
        );
        Ok(source)
    }
}
