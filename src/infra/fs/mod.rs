//! Filesystem access used by the watch pipeline.
//!
//! Everything the core touches on disk goes through [`FileSystem`] so that
//! tests can substitute transient failures (locked destinations, vanished
//! sources) without racing real processes.

mod atomic;

use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;

pub use atomic::{AtomicWriter, DEFAULT_RETRY_DELAY, PublishError, PublishReport, TEMP_EXTENSION};

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Regular files directly inside `dir`, in no particular order.
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    async fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Create or truncate `path` and write `contents` in full.
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Move `from` onto `to`, replacing `to` if it exists.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        tokio::fs::metadata(path).await?.modified()
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}
