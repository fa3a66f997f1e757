//! The REST capability set consumed by the adapter.
//!
//! A backend only knows whole objects: it can hand out an object's full
//! content, replace it, create it, and answer metadata and listing queries.
//! Every call reports an absent object as [`ApiError::NotFound`] (or an IO
//! error of kind `NotFound`) so the adapter can implement create-on-open.
//!
//! [`ApiError::NotFound`]: crate::ApiError::NotFound

use crate::error::ApiResult;
use crate::metadata::EntryInfo;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Owned byte stream returned by [`RestApi::get_content`].
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

/// Borrowed byte stream handed to [`RestApi::new_file`] and [`RestApi::update`].
///
/// The adapter keeps ownership of the bytes' storage; implementations read
/// the stream to the end before returning.
pub type ContentSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Whole-object REST storage operations.
///
/// Names are absolute, `/`-separated paths; the root is `/`. Cancellation is
/// expressed by dropping the returned future.
#[async_trait]
pub trait RestApi: Send + Sync + 'static {
    /// Fetch the full content of a file.
    async fn get_content(&self, name: &str) -> ApiResult<ContentStream>;

    /// Metadata for one object.
    async fn stat(&self, name: &str) -> ApiResult<EntryInfo>;

    /// Metadata for every direct child of a directory.
    async fn get_children(&self, name: &str) -> ApiResult<Vec<EntryInfo>>;

    /// Create a directory; the parent must exist.
    async fn mkdir(&self, name: &str, perm: u32) -> ApiResult<()>;

    /// Replace the content of an existing file.
    async fn update(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()>;

    /// Create a file with the given content.
    async fn new_file(&self, name: &str, content: ContentSource<'_>) -> ApiResult<()>;

    /// Remove an object and, for directories, everything below it.
    async fn remove_all(&self, name: &str) -> ApiResult<()>;

    /// Move an object to a new name.
    async fn rename(&self, old_name: &str, new_name: &str) -> ApiResult<()>;
}
