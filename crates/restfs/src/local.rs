//! [`RestApi`] implementation over a local directory.
//!
//! Stands in for a remote service when serving a directory tree: every
//! object name is resolved below the root directory and whole-object
//! operations map onto plain file operations.

use crate::backend::{ContentSource, ContentStream, RestApi};
use crate::error::{ApiError, ApiResult};
use crate::metadata::EntryInfo;
#[cfg(unix)]
use crate::metadata::DEFAULT_FILE_MODE;
use crate::paths;
use async_trait::async_trait;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::trace;

/// A backend that stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalDirApi {
    root: PathBuf,
}

impl LocalDirApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object name onto a path below the root.
    fn resolve(&self, name: &str) -> ApiResult<PathBuf> {
        let mut path = self.root.clone();
        for part in name.split('/').filter(|s| !s.is_empty()) {
            if part == "." || part == ".." || part.contains('\\') {
                return Err(ApiError::PermissionDenied(name.to_string()));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn info(name: &str, meta: &Metadata) -> EntryInfo {
        let base = paths::base_name(name);
        let info = if meta.is_dir() {
            EntryInfo::dir(base)
        } else {
            EntryInfo::file(base, meta.len())
        };
        let info = info.with_modified(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));
        match mode_of(meta) {
            Some(mode) => info.with_mode(mode),
            None => info,
        }
    }

    async fn write_content(
        &self,
        name: &str,
        options: &mut fs::OpenOptions,
        content: ContentSource<'_>,
    ) -> ApiResult<()> {
        let path = self.resolve(name)?;
        let mut file = options
            .open(&path)
            .await
            .map_err(|e| ApiError::from_io(name, e))?;
        let written = tokio::io::copy(content, &mut file).await?;
        file.flush().await?;
        trace!(name, written, "Wrote object content");
        Ok(())
    }
}

#[cfg(unix)]
fn mode_of(meta: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_meta: &Metadata) -> Option<u32> {
    None
}

#[async_trait]
impl RestApi for LocalDirApi {
    async fn get_content(&self, name: &str) -> ApiResult<ContentStream> {
        let path = self.resolve(name)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| ApiError::from_io(name, e))?;
        if meta.is_dir() {
            return Err(ApiError::IsADirectory(name.to_string()));
        }
        let file = fs::File::open(&path)
            .await
            .map_err(|e| ApiError::from_io(name, e))?;
        Ok(Box::new(file))
    }

    async fn stat(&self, name: &str) -> ApiResult<EntryInfo> {
        let path = self.resolve(name)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| ApiError::from_io(name, e))?;
        Ok(Self::info(name, &meta))
    }

    async fn get_children(&self, name: &str) -> ApiResult<Vec<EntryInfo>> {
        let path = self.resolve(name)?;
        let mut dir = fs::read_dir(&path)
            .await
            .map_err(|e| ApiError::from_io(name, e))?;

        let mut children = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let Some(child) = entry.file_name().to_str().map(str::to_string) else {
                trace!(name, "Skipping non UTF-8 entry");
                continue;
            };
            let child_name = paths::join(name, &child);
            match entry.metadata().await {
                Ok(meta) => children.push(Self::info(&child_name, &meta)),
                // Removed between listing and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ApiError::from_io(&child_name, e)),
            }
        }
        Ok(children)
    }

    async fn mkdir(&self, name: &str, perm: u32) -> ApiResult<()> {
        let path = self.resolve(name)?;
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(perm);
        #[cfg(not(unix))]
        let _ = perm;
        builder
            .create(&path)
            .await
            .map_err(|e| ApiError::from_io(name, e))
    }

    async fn update(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true);
        self.write_content(name, &mut options, content).await
    }

    async fn new_file(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(DEFAULT_FILE_MODE);
        self.write_content(name, &mut options, content).await
    }

    async fn remove_all(&self, name: &str) -> ApiResult<()> {
        if paths::normalize(name) == "/" {
            return Err(ApiError::PermissionDenied(name.to_string()));
        }
        let path = self.resolve(name)?;
        let result = match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).await,
            Ok(_) => fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::from_io(name, e)),
        }
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> ApiResult<()> {
        let from = self.resolve(old_name)?;
        let to = self.resolve(new_name)?;
        if from == self.root || to == self.root {
            return Err(ApiError::PermissionDenied(old_name.to_string()));
        }
        fs::rename(&from, &to)
            .await
            .map_err(|e| ApiError::from_io(old_name, e))
    }
}
