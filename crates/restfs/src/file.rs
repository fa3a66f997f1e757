//! WebDAV file handle implementation.
//!
//! A [`RestFile`] is one open/close session on a backend object. The backend
//! only moves whole objects, so the handle stages the object locally and
//! serves random access from the staged copy:
//!
//! - **Unmaterialized** (initial): nothing is stored locally. Seeks are pure
//!   arithmetic on a virtual position; seeking from the end costs one stat.
//! - **Staged**: entered on the first read or write. A buffer is allocated
//!   from the [`StagingStore`] and, unless the object is new or the open
//!   truncates, filled with the remote content. The buffer owns the position
//!   from then on.
//!
//! On [`RestFile::close`] the staged content is sent back with `new_file`
//! for objects that did not exist at open time and with `update` for
//! existing objects opened for writing. The staging buffer is released on
//! every path out of `close`.
//!
//! A handle dropped without `close` sends nothing, with one exception: a
//! creating handle that was never written still creates the empty object,
//! from a task on the current runtime.

use crate::backend::RestApi;
use crate::error::{ErrorKind, RestFsError, RestFsResult};
use crate::metadata::{DEFAULT_FILE_MODE, EntryInfo, PendingFile, RestMetaData};
use crate::paths;
use crate::staging::{StagingBuffer, StagingStore};
use bytes::Bytes;
use dav_server::fs::{DavFile, DavMetaData, FsFuture, OpenOptions};
use std::collections::VecDeque;
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Access mode requested when opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Writes are allowed and the content is sent back on close.
    pub write: bool,
    /// Every write goes to the end of the content.
    pub append: bool,
    /// Existing content is discarded instead of fetched.
    pub truncate: bool,
    /// Create the object if it does not exist.
    pub create: bool,
    /// Create the object and fail if it already exists.
    pub create_new: bool,
    /// Permission bits for a created object.
    pub mode: u32,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::read_only()
    }
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// Write, create and truncate: the flags of a whole-file upload.
    pub fn create_file() -> Self {
        Self::read_only().with_write().with_create().with_truncate()
    }

    #[must_use]
    pub fn with_write(mut self) -> Self {
        self.write = true;
        self
    }

    #[must_use]
    pub fn with_append(mut self) -> Self {
        self.write = true;
        self.append = true;
        self
    }

    #[must_use]
    pub fn with_truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    #[must_use]
    pub fn with_create(mut self) -> Self {
        self.create = true;
        self
    }

    #[must_use]
    pub fn with_create_new(mut self) -> Self {
        self.create_new = true;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Whether a missing object may be created by this open.
    pub fn wants_create(&self) -> bool {
        self.create || self.create_new
    }

    pub fn is_writable(&self) -> bool {
        self.write || self.append
    }
}

impl From<OpenOptions> for OpenFlags {
    fn from(options: OpenOptions) -> Self {
        Self {
            write: options.write || options.append,
            append: options.append,
            truncate: options.truncate,
            create: options.create,
            create_new: options.create_new,
            mode: DEFAULT_FILE_MODE,
        }
    }
}

/// Local content state of a handle.
enum Content {
    /// No local copy; `position` is the virtual offset.
    Unmaterialized { position: u64 },
    /// Content lives in a staging buffer, which tracks the position.
    Staged(Box<dyn StagingBuffer>),
    /// `close` has run; `committed` is set when it succeeded.
    Closed { committed: bool },
}

struct HandleState {
    content: Content,
    /// Entries not yet returned by `readdir`.
    listing: Option<VecDeque<EntryInfo>>,
}

/// What `close` sends to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushAction {
    Create,
    Update,
    Skip,
}

/// A file handle for one open() call on a backend object.
pub struct RestFile {
    name: String,
    existed_at_open: bool,
    is_dir: bool,
    flags: OpenFlags,
    api: Arc<dyn RestApi>,
    staging: Arc<dyn StagingStore>,
    state: Mutex<HandleState>,
}

impl fmt::Debug for RestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestFile")
            .field("name", &self.name)
            .field("existed_at_open", &self.existed_at_open)
            .field("is_dir", &self.is_dir)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl RestFile {
    /// Create a handle. No content is touched until the first read or write.
    pub(crate) fn new(
        name: String,
        existing: Option<&EntryInfo>,
        flags: OpenFlags,
        api: Arc<dyn RestApi>,
        staging: Arc<dyn StagingStore>,
    ) -> Self {
        Self {
            name,
            existed_at_open: existing.is_some(),
            is_dir: existing.is_some_and(|info| info.is_dir),
            flags,
            api,
            staging,
            state: Mutex::new(HandleState {
                content: Content::Unmaterialized { position: 0 },
                listing: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// False when this open is creating the object.
    pub fn existed_at_open(&self) -> bool {
        self.existed_at_open
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Returns true once the handle holds a local copy of the content.
    pub async fn is_staged(&self) -> bool {
        matches!(self.state.lock().await.content, Content::Staged(_))
    }

    /// Move the position.
    ///
    /// Before the first read or write this never fetches content.
    pub async fn seek(&self, pos: SeekFrom) -> RestFsResult<u64> {
        let mut state = self.state.lock().await;
        match &mut state.content {
            Content::Staged(buffer) => buffer.seek(pos).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidInput {
                    RestFsError::invalid_argument(format!("seek {} to {pos:?}", self.name))
                } else {
                    RestFsError::staging(format!("seek staged {}", self.name), e)
                }
            }),
            Content::Unmaterialized { position } => {
                let target = match pos {
                    SeekFrom::Start(offset) => i128::from(offset),
                    SeekFrom::Current(offset) => i128::from(*position) + i128::from(offset),
                    SeekFrom::End(offset) => i128::from(self.remote_size().await?) + i128::from(offset),
                };
                let new_position = u64::try_from(target).map_err(|_| {
                    RestFsError::invalid_argument(format!(
                        "seek {} to offset {target}",
                        self.name
                    ))
                })?;
                trace!(name = %self.name, position = new_position, "Virtual seek");
                *position = new_position;
                Ok(new_position)
            }
            Content::Closed { .. } => Err(self.closed_error("seek")),
        }
    }

    /// Read into `buf`, staging the content first if needed.
    ///
    /// Returns 0 at the end of the content.
    pub async fn read(&self, buf: &mut [u8]) -> RestFsResult<usize> {
        let mut state = self.state.lock().await;
        let buffer = self.staged(&mut state.content, "read").await?;
        buffer
            .read(buf)
            .await
            .map_err(|e| RestFsError::staging(format!("read staged {}", self.name), e))
    }

    /// Write all of `data` at the current position (or the end, in append mode).
    pub async fn write(&self, data: &[u8]) -> RestFsResult<usize> {
        if !self.flags.is_writable() {
            return Err(RestFsError::new(
                ErrorKind::PermissionDenied,
                format!("write {}: opened read-only", self.name),
            ));
        }

        let mut state = self.state.lock().await;
        let buffer = self.staged(&mut state.content, "write").await?;
        let staging_err = |e| RestFsError::staging(format!("write staged {}", self.name), e);
        if self.flags.append {
            buffer.seek(SeekFrom::End(0)).await.map_err(staging_err)?;
        }
        buffer.write_all(data).await.map_err(staging_err)?;
        buffer.flush().await.map_err(staging_err)?;
        Ok(data.len())
    }

    /// Return up to `count` further directory entries (all remaining when 0).
    ///
    /// The listing is fetched once, on the first call; an empty result
    /// means every entry has been returned.
    pub async fn readdir(&self, count: usize) -> RestFsResult<Vec<EntryInfo>> {
        let mut state = self.state.lock().await;
        if matches!(state.content, Content::Closed { .. }) {
            return Err(self.closed_error("readdir"));
        }

        if state.listing.is_none() {
            let children = self
                .api
                .get_children(&self.name)
                .await
                .map_err(|e| RestFsError::backend(format!("list {}", self.name), e))?;
            state.listing = Some(children.into());
        }

        let remaining = state.listing.get_or_insert_with(VecDeque::new);
        let take = if count == 0 {
            remaining.len()
        } else {
            count.min(remaining.len())
        };
        Ok(remaining.drain(..take).collect())
    }

    /// Metadata for the handle's object.
    ///
    /// A created object that has not been flushed yet has no remote metadata;
    /// it is reported as an empty regular file instead.
    pub async fn stat(&self) -> RestFsResult<RestMetaData> {
        let committed = matches!(
            self.state.lock().await.content,
            Content::Closed { committed: true }
        );
        if !self.existed_at_open && self.flags.wants_create() && !committed {
            let pending = PendingFile::new(paths::base_name(&self.name), self.flags.mode);
            return Ok(pending.into());
        }

        self.api
            .stat(&self.name)
            .await
            .map(RestMetaData::from)
            .map_err(|e| RestFsError::backend(format!("stat {}", self.name), e))
    }

    /// Send staged content to the backend and release local storage.
    ///
    /// A second call is a no-op.
    pub async fn close(&self) -> RestFsResult<()> {
        let mut state = self.state.lock().await;
        state.listing = None;
        let mut staged = match std::mem::replace(
            &mut state.content,
            Content::Closed { committed: false },
        ) {
            Content::Closed { committed } => {
                state.content = Content::Closed { committed };
                return Ok(());
            }
            Content::Unmaterialized { .. } => None,
            Content::Staged(buffer) => Some(buffer),
        };

        let result = self.commit(staged.as_mut()).await;

        if let Some(buffer) = staged
            && let Err(e) = buffer.release()
        {
            warn!(name = %self.name, error = %e, "Failed to release staging buffer");
        }

        if result.is_ok() {
            state.content = Content::Closed { committed: true };
        }
        result
    }

    fn flush_action(&self, staged: bool) -> FlushAction {
        if self.is_dir {
            FlushAction::Skip
        } else if !self.existed_at_open {
            FlushAction::Create
        } else if self.flags.is_writable() && (staged || self.flags.truncate) {
            FlushAction::Update
        } else {
            FlushAction::Skip
        }
    }

    async fn commit(&self, staged: Option<&mut Box<dyn StagingBuffer>>) -> RestFsResult<()> {
        let action = self.flush_action(staged.is_some());
        send_content(self.api.as_ref(), &self.name, action, staged).await
    }

    /// Get the staging buffer, materializing it on first use.
    async fn staged<'a>(
        &self,
        content: &'a mut Content,
        op: &str,
    ) -> RestFsResult<&'a mut Box<dyn StagingBuffer>> {
        if let Content::Unmaterialized { position } = *content {
            let buffer = self.materialize(position).await?;
            *content = Content::Staged(buffer);
        }
        match content {
            Content::Staged(buffer) => Ok(buffer),
            _ => Err(self.closed_error(op)),
        }
    }

    async fn materialize(&self, position: u64) -> RestFsResult<Box<dyn StagingBuffer>> {
        if self.is_dir {
            return Err(RestFsError::invalid_argument(format!(
                "{} is a directory",
                self.name
            )));
        }

        let mut buffer = self.staging.allocate(&self.name).await.map_err(|e| {
            RestFsError::staging(format!("allocate staging buffer for {}", self.name), e)
        })?;

        let mut copied = 0;
        if self.existed_at_open && !self.flags.truncate {
            let mut remote = self
                .api
                .get_content(&self.name)
                .await
                .map_err(|e| RestFsError::backend(format!("fetch {}", self.name), e))?;
            copied = tokio::io::copy(&mut remote, &mut buffer).await.map_err(|e| {
                RestFsError::staging(format!("copy {} into staging buffer", self.name), e)
            })?;
        }

        let position = if self.flags.append { copied } else { position };
        buffer
            .seek(SeekFrom::Start(position))
            .await
            .map_err(|e| RestFsError::staging(format!("position staged {}", self.name), e))?;

        debug!(name = %self.name, copied, position, "Staged object content");
        Ok(buffer)
    }

    /// Size used for seeks from the end before anything is staged.
    async fn remote_size(&self) -> RestFsResult<u64> {
        if !self.existed_at_open || self.flags.truncate {
            return Ok(0);
        }
        let info = self
            .api
            .stat(&self.name)
            .await
            .map_err(|e| RestFsError::backend(format!("stat {}", self.name), e))?;
        Ok(info.size)
    }

    /// Send an empty create for a dropped handle on the current runtime.
    fn create_in_background(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(name = %self.name, "File handle dropped outside a runtime, object not created");
            return;
        };

        debug!(name = %self.name, "File handle dropped before close, creating empty object");
        let api = Arc::clone(&self.api);
        let name = self.name.clone();
        runtime.spawn(async move {
            if let Err(e) = send_content(api.as_ref(), &name, FlushAction::Create, None).await {
                warn!(name = %name, error = %e, "Failed to create object for dropped handle");
            }
        });
    }

    fn closed_error(&self, op: &str) -> RestFsError {
        RestFsError::invalid_argument(format!("{op} {}: file handle is closed", self.name))
    }
}

/// Send a handle's content to the backend according to `action`.
///
/// Without a staging buffer the object is sent empty.
async fn send_content(
    api: &dyn RestApi,
    name: &str,
    action: FlushAction,
    staged: Option<&mut Box<dyn StagingBuffer>>,
) -> RestFsResult<()> {
    if action == FlushAction::Skip {
        trace!(name = %name, "Nothing to flush");
        return Ok(());
    }

    let mut empty = tokio::io::empty();
    let source: &mut (dyn tokio::io::AsyncRead + Send + Unpin) = match staged {
        Some(buffer) => {
            buffer
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|e| RestFsError::staging(format!("rewind staged {name}"), e))?;
            buffer.as_reader()
        }
        None => &mut empty,
    };

    match action {
        FlushAction::Create => {
            debug!(name = %name, "Creating object");
            api.new_file(name, source)
                .await
                .map_err(|e| RestFsError::backend(format!("create {name}"), e))
        }
        FlushAction::Update => {
            debug!(name = %name, "Updating object");
            api.update(name, source)
                .await
                .map_err(|e| RestFsError::backend(format!("update {name}"), e))
        }
        FlushAction::Skip => Ok(()),
    }
}

impl Drop for RestFile {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let content = std::mem::replace(&mut state.content, Content::Closed { committed: false });
        let staged = match content {
            Content::Closed { .. } => return,
            Content::Unmaterialized { .. } => None,
            Content::Staged(buffer) => Some(buffer),
        };

        match self.flush_action(staged.is_some()) {
            FlushAction::Skip => {}
            // Opened with create intent and never written: the object must
            // still come into existence, empty. The WebDAV engine drops the
            // handle of a LOCK on an unmapped URL without flushing it.
            FlushAction::Create if staged.is_none() => self.create_in_background(),
            FlushAction::Create | FlushAction::Update => {
                warn!(name = %self.name, "File handle dropped without close, discarding pending content");
            }
        }

        if let Some(buffer) = staged
            && let Err(e) = buffer.release()
        {
            warn!(name = %self.name, error = %e, "Failed to release staging buffer");
        }
    }
}

impl DavFile for RestFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        Box::pin(async move {
            let meta = RestFile::stat(self).await?;
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        Box::pin(async move {
            let mut buf = vec![0u8; count];
            let mut filled = 0;
            while filled < count {
                let n = RestFile::read(self, &mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(Bytes::from(buf))
        })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        Box::pin(async move {
            RestFile::write(self, &buf).await?;
            Ok(())
        })
    }

    fn write_buf(&mut self, mut buf: Box<dyn bytes::Buf + Send>) -> FsFuture<'_, ()> {
        Box::pin(async move {
            let bytes = buf.copy_to_bytes(buf.remaining());
            RestFile::write(self, &bytes).await?;
            Ok(())
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        Box::pin(async move { Ok(RestFile::seek(self, pos).await?) })
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        // The WebDAV engine flushes once after a PUT body and then drops the
        // handle, so this is where the session ends.
        Box::pin(async move { Ok(RestFile::close(self).await?) })
    }
}
