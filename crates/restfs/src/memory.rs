//! In-memory [`RestApi`] implementation.
//!
//! Keeps every object in a map keyed by normalized name. Useful for tests
//! and for running the server without a remote service.

use crate::backend::{ContentSource, ContentStream, RestApi};
use crate::error::{ApiError, ApiResult};
use crate::metadata::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, EntryInfo};
use crate::paths;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tracing::trace;

#[derive(Debug, Clone)]
enum Node {
    File {
        content: Vec<u8>,
        modified: SystemTime,
        mode: u32,
    },
    Dir {
        modified: SystemTime,
        mode: u32,
    },
}

impl Node {
    fn dir(mode: u32) -> Self {
        Node::Dir {
            modified: SystemTime::now(),
            mode,
        }
    }

    fn file(content: Vec<u8>) -> Self {
        Node::File {
            content,
            modified: SystemTime::now(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    fn info(&self, name: &str) -> EntryInfo {
        let base = paths::base_name(name);
        match self {
            Node::File {
                content,
                modified,
                mode,
            } => EntryInfo::file(base, content.len() as u64)
                .with_modified(*modified)
                .with_mode(*mode),
            Node::Dir { modified, mode } => EntryInfo::dir(base)
                .with_modified(*modified)
                .with_mode(*mode),
        }
    }
}

/// A backend whose objects live in memory. The root `/` always exists.
#[derive(Debug)]
pub struct MemoryApi {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryApi {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::dir(DEFAULT_DIR_MODE));
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Create a backend holding the given files; parent directories are
    /// created as needed.
    pub fn with_files<N, C>(files: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let api = Self::new();
        {
            let mut nodes = api.nodes.write();
            for (name, content) in files {
                let name = paths::normalize(name.as_ref());
                let mut dir = paths::parent(&name);
                while let Some(d) = dir {
                    nodes
                        .entry(d.to_string())
                        .or_insert_with(|| Node::dir(DEFAULT_DIR_MODE));
                    dir = paths::parent(d);
                }
                nodes.insert(name, Node::file(content.as_ref().to_vec()));
            }
        }
        api
    }

    /// Content of a file, `None` if absent or a directory.
    pub fn content(&self, name: &str) -> Option<Vec<u8>> {
        match self.nodes.read().get(&paths::normalize(name)) {
            Some(Node::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().contains_key(&paths::normalize(name))
    }

    /// Number of objects, including the root.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn check_parent(nodes: &BTreeMap<String, Node>, name: &str) -> ApiResult<()> {
        let Some(parent) = paths::parent(name) else {
            return Err(ApiError::AlreadyExists(name.to_string()));
        };
        match nodes.get(parent) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(ApiError::NotADirectory(parent.to_string())),
            None => Err(ApiError::NotFound(parent.to_string())),
        }
    }

    /// Names of `name` and everything below it.
    fn subtree(nodes: &BTreeMap<String, Node>, name: &str) -> Vec<String> {
        nodes
            .range(name.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(name))
            .filter(|k| paths::is_within(k, name))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RestApi for MemoryApi {
    async fn get_content(&self, name: &str) -> ApiResult<ContentStream> {
        let name = paths::normalize(name);
        match self.nodes.read().get(&name) {
            Some(Node::File { content, .. }) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(Node::Dir { .. }) => Err(ApiError::IsADirectory(name)),
            None => Err(ApiError::NotFound(name)),
        }
    }

    async fn stat(&self, name: &str) -> ApiResult<EntryInfo> {
        let name = paths::normalize(name);
        self.nodes
            .read()
            .get(&name)
            .map(|node| node.info(&name))
            .ok_or(ApiError::NotFound(name))
    }

    async fn get_children(&self, name: &str) -> ApiResult<Vec<EntryInfo>> {
        let name = paths::normalize(name);
        let nodes = self.nodes.read();
        match nodes.get(&name) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(ApiError::NotADirectory(name)),
            None => return Err(ApiError::NotFound(name)),
        }

        let children = Self::subtree(&nodes, &name)
            .into_iter()
            .filter(|child| paths::parent(child) == Some(name.as_str()))
            .filter_map(|child| nodes.get(&child).map(|node| node.info(&child)))
            .collect();
        Ok(children)
    }

    async fn mkdir(&self, name: &str, perm: u32) -> ApiResult<()> {
        let name = paths::normalize(name);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&name) {
            return Err(ApiError::AlreadyExists(name));
        }
        Self::check_parent(&nodes, &name)?;
        trace!(name = %name, "mkdir");
        nodes.insert(name, Node::dir(perm));
        Ok(())
    }

    async fn update(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()> {
        let name = paths::normalize(name);
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;

        let mut nodes = self.nodes.write();
        match nodes.get_mut(&name) {
            Some(Node::File {
                content, modified, ..
            }) => {
                trace!(name = %name, len = data.len(), "update");
                *content = data;
                *modified = SystemTime::now();
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(ApiError::IsADirectory(name)),
            None => Err(ApiError::NotFound(name)),
        }
    }

    async fn new_file(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()> {
        let name = paths::normalize(name);
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;

        let mut nodes = self.nodes.write();
        if let Some(Node::Dir { .. }) = nodes.get(&name) {
            return Err(ApiError::IsADirectory(name));
        }
        Self::check_parent(&nodes, &name)?;
        trace!(name = %name, len = data.len(), "new_file");
        nodes.insert(name, Node::file(data));
        Ok(())
    }

    async fn remove_all(&self, name: &str) -> ApiResult<()> {
        let name = paths::normalize(name);
        if name == "/" {
            return Err(ApiError::PermissionDenied(name));
        }
        let mut nodes = self.nodes.write();
        for key in Self::subtree(&nodes, &name) {
            nodes.remove(&key);
        }
        Ok(())
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> ApiResult<()> {
        let old_name = paths::normalize(old_name);
        let new_name = paths::normalize(new_name);
        if old_name == "/" || new_name == "/" {
            return Err(ApiError::PermissionDenied(old_name));
        }
        if old_name == new_name {
            return Ok(());
        }
        // Neither name may contain the other
        if paths::is_within(&new_name, &old_name) {
            return Err(ApiError::PermissionDenied(new_name));
        }
        if paths::is_within(&old_name, &new_name) {
            return Err(ApiError::PermissionDenied(old_name));
        }

        let mut nodes = self.nodes.write();
        let source_is_dir = match nodes.get(&old_name) {
            Some(node) => matches!(node, Node::Dir { .. }),
            None => return Err(ApiError::NotFound(old_name)),
        };
        Self::check_parent(&nodes, &new_name)?;
        match nodes.get(&new_name) {
            Some(Node::Dir { .. }) if !source_is_dir => return Err(ApiError::IsADirectory(new_name)),
            Some(Node::File { .. }) if source_is_dir => {
                return Err(ApiError::NotADirectory(new_name));
            }
            // Only an empty directory can be replaced
            Some(Node::Dir { .. }) if Self::subtree(&nodes, &new_name).len() > 1 => {
                return Err(ApiError::AlreadyExists(new_name));
            }
            _ => {}
        }

        for key in Self::subtree(&nodes, &new_name) {
            nodes.remove(&key);
        }
        for key in Self::subtree(&nodes, &old_name) {
            if let Some(node) = nodes.remove(&key) {
                let moved = format!("{new_name}{}", &key[old_name.len()..]);
                nodes.insert(moved, node);
            }
        }
        trace!(from = %old_name, to = %new_name, "rename");
        Ok(())
    }
}
