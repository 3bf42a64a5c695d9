// src/fs/mod.rs

//! Filesystem access used by the collector.
//!
//! All operations are async so that directory creation and log appends are
//! suspension points of the collector task rather than blocking calls.

use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

pub mod mock;

/// Boxed future returned by [`FileSystem`] methods.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Create `path` and all missing parents. Existing directories are fine.
    fn create_dir_all<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()>;

    /// Append `line` followed by a newline to `path`, creating the file if
    /// needed. The bytes are written as-is. The handle is released before
    /// the future completes.
    fn append_line<'a>(&'a self, path: &'a Path, line: &'a [u8]) -> FsFuture<'a, ()>;

    /// Replace the contents of `path`, creating parent directories.
    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FsFuture<'a, ()>;
}

/// Implementation backed by `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn create_dir_all<'a>(&'a self, path: &'a Path) -> FsFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::create_dir_all(path)
                .await
                .with_context(|| format!("creating dir {:?}", path))
        })
    }

    fn append_line<'a>(&'a self, path: &'a Path, line: &'a [u8]) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("opening {:?} for append", path))?;

            let mut buf = Vec::with_capacity(line.len() + 1);
            buf.extend_from_slice(line);
            buf.push(b'\n');

            file.write_all(&buf)
                .await
                .with_context(|| format!("appending to {:?}", path))?;
            file.flush()
                .await
                .with_context(|| format!("flushing {:?}", path))?;
            Ok(())
        })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("writing to file {:?}", path))
        })
    }
}
