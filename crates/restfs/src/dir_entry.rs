//! WebDAV directory entry implementation for backend objects.

use crate::metadata::{EntryInfo, RestMetaData};
use dav_server::fs::{DavDirEntry, DavMetaData, FsFuture};

/// A directory entry built from backend metadata.
#[derive(Debug, Clone)]
pub struct RestDirEntry(EntryInfo);

impl RestDirEntry {
    pub fn new(info: EntryInfo) -> Self {
        RestDirEntry(info)
    }
}

impl From<EntryInfo> for RestDirEntry {
    fn from(info: EntryInfo) -> Self {
        RestDirEntry(info)
    }
}

impl DavDirEntry for RestDirEntry {
    fn name(&self) -> Vec<u8> {
        self.0.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = RestMetaData::Entry(self.0.clone());
        Box::pin(async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) })
    }

    fn is_dir(&self) -> FsFuture<'_, bool> {
        let is_dir = self.0.is_dir;
        Box::pin(async move { Ok(is_dir) })
    }

    fn is_file(&self) -> FsFuture<'_, bool> {
        let is_file = !self.0.is_dir;
        Box::pin(async move { Ok(is_file) })
    }

    fn is_symlink(&self) -> FsFuture<'_, bool> {
        Box::pin(async { Ok(false) })
    }
}
