//! WebDAV filesystem implementation over a REST backend.
//!
//! [`RestFileSystem`] answers directory-level operations by calling the
//! [`RestApi`] directly and hands out [`RestFile`] handles for content
//! access. Opening never touches content; see [`crate::file`] for how
//! handles stage and flush objects.

use crate::backend::RestApi;
use crate::dir_entry::RestDirEntry;
use crate::error::{ErrorKind, RestFsError, RestFsResult};
use crate::file::{OpenFlags, RestFile};
use crate::metadata::{DEFAULT_DIR_MODE, EntryInfo, RestMetaData};
use crate::paths;
use crate::staging::StagingStore;
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsFuture, FsStream, OpenOptions, ReadDirMeta,
};
use futures::future::BoxFuture;
use futures::stream;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Chunk size used when copying file content between handles.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// WebDAV filesystem backed by a REST object store.
///
/// Cloning is cheap; clones share the backend and the staging store.
#[derive(Clone)]
pub struct RestFileSystem {
    api: Arc<dyn RestApi>,
    staging: Arc<dyn StagingStore>,
}

impl fmt::Debug for RestFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestFileSystem")
            .field("staging", &self.staging)
            .finish_non_exhaustive()
    }
}

impl RestFileSystem {
    /// Create a filesystem over `api`, staging open handles in `staging`.
    pub fn new(api: Arc<dyn RestApi>, staging: Arc<dyn StagingStore>) -> Self {
        Self { api, staging }
    }

    /// Parse a WebDAV path to a backend object name.
    fn parse_path(path: &DavPath) -> String {
        let raw = String::from_utf8_lossy(path.as_bytes());
        let name = paths::normalize(&raw);
        trace!(raw_path = %raw, name = %name, "parse_path");
        name
    }

    /// Metadata of every direct child of `name`.
    ///
    /// An empty directory yields an empty list.
    pub async fn list_directory(&self, name: &str) -> RestFsResult<Vec<EntryInfo>> {
        let name = paths::normalize(name);
        let children = self
            .api
            .get_children(&name)
            .await
            .map_err(|e| RestFsError::backend(format!("list directory {name}"), e))?;
        trace!(name = %name, count = children.len(), "Directory entries found");
        Ok(children)
    }

    /// Open `name` for the access described by `flags`.
    ///
    /// Only the object's metadata is probed. A missing object is an error
    /// unless `flags` asks for creation, in which case the handle creates
    /// it on close.
    pub async fn open(&self, name: &str, flags: OpenFlags) -> RestFsResult<RestFile> {
        let name = paths::normalize(name);
        let existing = match self.api.stat(&name).await {
            Ok(info) => Some(info),
            Err(e) if e.is_not_found() && flags.wants_create() => None,
            Err(e) => return Err(RestFsError::backend(format!("open {name}"), e)),
        };

        if existing.is_some() && flags.create_new {
            return Err(RestFsError::new(
                ErrorKind::AlreadyExists,
                format!("open {name}: exclusive create of an existing object"),
            ));
        }

        debug!(name = %name, existed = existing.is_some(), ?flags, "Opened handle");
        Ok(RestFile::new(
            name,
            existing.as_ref(),
            flags,
            self.api.clone(),
            self.staging.clone(),
        ))
    }

    /// Create the directory `name`; its parent must exist.
    pub async fn make_directory(&self, name: &str, perm: u32) -> RestFsResult<()> {
        let name = paths::normalize(name);
        self.api
            .mkdir(&name, perm)
            .await
            .map_err(|e| RestFsError::backend(format!("make directory {name}"), e))
    }

    /// Remove `name` and everything below it.
    pub async fn remove_all(&self, name: &str) -> RestFsResult<()> {
        let name = paths::normalize(name);
        self.api
            .remove_all(&name)
            .await
            .map_err(|e| RestFsError::backend(format!("remove {name}"), e))
    }

    pub async fn rename(&self, old_name: &str, new_name: &str) -> RestFsResult<()> {
        let old_name = paths::normalize(old_name);
        let new_name = paths::normalize(new_name);
        self.api
            .rename(&old_name, &new_name)
            .await
            .map_err(|e| RestFsError::backend(format!("rename {old_name} to {new_name}"), e))
    }

    pub async fn stat(&self, name: &str) -> RestFsResult<EntryInfo> {
        let name = paths::normalize(name);
        self.api
            .stat(&name)
            .await
            .map_err(|e| RestFsError::backend(format!("stat {name}"), e))
    }

    /// Every object at or below `root`, depth-first in name order.
    ///
    /// Each directory is listed before its contents.
    pub async fn walk(&self, root: &str) -> RestFsResult<Vec<(String, EntryInfo)>> {
        let root = paths::normalize(root);
        let info = self.stat(&root).await?;

        let mut found = Vec::new();
        let mut pending = vec![(root, info)];
        while let Some((name, info)) = pending.pop() {
            let is_dir = info.is_dir;
            if is_dir {
                let mut children = self.list_directory(&name).await?;
                // Reverse order so the stack pops them alphabetically
                children.sort_by(|a, b| b.name.cmp(&a.name));
                pending.extend(
                    children
                        .into_iter()
                        .map(|child| (paths::join(&name, &child.name), child)),
                );
            }
            found.push((name, info));
        }
        Ok(found)
    }

    /// Copy `from` to `to`; directories are copied recursively.
    ///
    /// Directories keep their mode. Files are created through `new_file`,
    /// which carries no mode, so copies get the backend's default.
    pub async fn copy(&self, from: &str, to: &str) -> RestFsResult<()> {
        self.copy_tree(paths::normalize(from), paths::normalize(to))
            .await
    }

    fn copy_tree(&self, from: String, to: String) -> BoxFuture<'_, RestFsResult<()>> {
        Box::pin(async move {
            let info = self.stat(&from).await?;
            if !info.is_dir {
                return self.copy_file(&from, &to).await;
            }

            if paths::is_within(&to, &from) {
                return Err(RestFsError::invalid_argument(format!(
                    "copy {from} into itself ({to})"
                )));
            }
            self.make_directory(&to, info.mode).await?;
            for child in self.list_directory(&from).await? {
                self.copy_tree(paths::join(&from, &child.name), paths::join(&to, &child.name))
                    .await?;
            }
            Ok(())
        })
    }

    async fn copy_file(&self, from: &str, to: &str) -> RestFsResult<()> {
        let source = self.open(from, OpenFlags::read_only()).await?;
        let target = self.open(to, OpenFlags::create_file()).await?;

        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            target.write(&buf[..n]).await?;
            copied += n as u64;
        }

        source.close().await?;
        target
            .close()
            .await
            .map_err(|e| e.context(format!("copy {from} to {to}")))?;
        debug!(from, to, copied, "Copied file");
        Ok(())
    }
}

impl DavFileSystem for RestFileSystem {
    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            let file = RestFileSystem::open(self, &name, OpenFlags::from(options)).await?;
            Ok(Box::new(file) as Box<dyn DavFile>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            let entries: Vec<Box<dyn DavDirEntry>> = self
                .list_directory(&name)
                .await?
                .into_iter()
                .map(|info| Box::new(RestDirEntry::new(info)) as Box<dyn DavDirEntry>)
                .collect();
            Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))) as FsStream<_>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            let info = self.stat(&name).await?;
            Ok(Box::new(RestMetaData::from(info)) as Box<dyn DavMetaData>)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            Ok(self.make_directory(&name, DEFAULT_DIR_MODE).await?)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            Ok(self.remove_all(&name).await?)
        })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.as_url_string()))]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let name = Self::parse_path(path);
            Ok(self.remove_all(&name).await?)
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from = Self::parse_path(from);
            let to = Self::parse_path(to);
            Ok(RestFileSystem::rename(self, &from, &to).await?)
        })
    }

    #[instrument(level = "debug", skip(self), fields(from = %from.as_url_string(), to = %to.as_url_string()))]
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        Box::pin(async move {
            let from = Self::parse_path(from);
            let to = Self::parse_path(to);
            Ok(RestFileSystem::copy(self, &from, &to).await?)
        })
    }

    fn have_props<'a>(
        &'a self,
        _path: &'a DavPath,
    ) -> std::pin::Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        // Dead properties are not stored
        Box::pin(async { false })
    }
}
