//! Local staging storage for open file handles.
//!
//! A handle copies the remote object into a [`StagingBuffer`] on its first
//! read or write and serves random access from there. Buffers come from a
//! [`StagingStore`] injected into the filesystem at construction:
//!
//! - [`TempDirStaging`]: one temporary file per handle inside a directory
//! - [`MemoryStaging`]: an in-memory cursor, for tests and small objects
//!
//! A buffer belongs to exactly one handle and is released when the handle
//! closes (or is dropped).

use async_trait::async_trait;
use std::fmt;
use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};
use tracing::trace;

/// Random-access local storage backing one open handle.
pub trait StagingBuffer: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin + fmt::Debug {
    /// View the buffer as a plain byte stream (for handing to the backend).
    fn as_reader(&mut self) -> &mut (dyn AsyncRead + Send + Unpin);

    /// Release the underlying storage.
    ///
    /// Dropping a buffer also releases it; this variant reports failures.
    fn release(self: Box<Self>) -> io::Result<()>;
}

/// Provider of staging buffers.
#[async_trait]
pub trait StagingStore: Send + Sync + fmt::Debug + 'static {
    /// Allocate an empty buffer for the object `name`.
    async fn allocate(&self, name: &str) -> io::Result<Box<dyn StagingBuffer>>;
}

/// Longest object-derived part of a staging file name, in bytes.
const PREFIX_MAX_BYTES: usize = 64;

/// Stages each handle in its own temporary file below a directory.
#[derive(Debug, Clone)]
pub struct TempDirStaging {
    dir: PathBuf,
}

impl TempDirStaging {
    /// Stage files below `dir` (created on first use).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stage files below `<system temp>/restfs`.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir().join("restfs"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name prefix derived from the object name.
    ///
    /// At most [`PREFIX_MAX_BYTES`] bytes, cut on a character boundary, so
    /// the random suffix always fits within the file name limit.
    fn prefix(name: &str) -> String {
        let mut prefix = String::with_capacity(PREFIX_MAX_BYTES + 1);
        for c in name.trim_start_matches('/').chars() {
            let c = if c == '/' || c == '\\' { '_' } else { c };
            if prefix.len() + c.len_utf8() > PREFIX_MAX_BYTES {
                break;
            }
            prefix.push(c);
        }
        prefix.push('.');
        prefix
    }
}

#[async_trait]
impl StagingStore for TempDirStaging {
    async fn allocate(&self, name: &str) -> io::Result<Box<dyn StagingBuffer>> {
        let dir = self.dir.clone();
        let prefix = Self::prefix(name);
        let (file, path) = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let named = tempfile::Builder::new().prefix(&prefix).tempfile_in(&dir)?;
            Ok::<_, io::Error>(named.into_parts())
        })
        .await
        .map_err(io::Error::other)??;

        trace!(path = %path.display(), "Allocated staging file");
        Ok(Box::new(DiskBuffer {
            file: tokio::fs::File::from_std(file),
            path,
        }))
    }
}

/// Stages each handle in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStaging;

#[async_trait]
impl StagingStore for MemoryStaging {
    async fn allocate(&self, _name: &str) -> io::Result<Box<dyn StagingBuffer>> {
        Ok(Box::new(MemoryBuffer::default()))
    }
}

/// A temporary file that is unlinked on release.
#[derive(Debug)]
struct DiskBuffer {
    file: tokio::fs::File,
    path: TempPath,
}

impl StagingBuffer for DiskBuffer {
    fn as_reader(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        self
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        let DiskBuffer { file, path } = *self;
        drop(file);
        trace!(path = %path.display(), "Releasing staging file");
        path.close()
    }
}

impl AsyncRead for DiskBuffer {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl AsyncWrite for DiskBuffer {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

impl AsyncSeek for DiskBuffer {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.file).poll_complete(cx)
    }
}

/// An in-memory cursor.
#[derive(Debug, Default)]
struct MemoryBuffer(Cursor<Vec<u8>>);

impl StagingBuffer for MemoryBuffer {
    fn as_reader(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        self
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for MemoryBuffer {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryBuffer {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl AsyncSeek for MemoryBuffer {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.0).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.0).poll_complete(cx)
    }
}
