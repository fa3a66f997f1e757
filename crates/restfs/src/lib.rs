//! WebDAV filesystem adapter for whole-object REST storage.
//!
//! REST object stores only know whole objects: fetch everything, replace
//! everything, stat, list, mkdir, remove and rename. WebDAV clients expect a
//! random-access filesystem. This crate bridges the two.
//!
//! # How It Works
//!
//! 1. [`RestFileSystem`] implements the dav-server filesystem contract by
//!    calling a [`RestApi`] for every directory-level operation
//! 2. Opening a file only stats it; the returned [`RestFile`] copies the
//!    object into a local staging buffer on the first read or write
//! 3. Closing the handle sends the staged content back, creating the
//!    object if it did not exist at open time
//!
//! Staging storage is injected through [`StagingStore`], so tests can stage
//! in memory and servers in a temp directory of their choosing.
//!
//! # Example
//!
//! ```ignore
//! use restfs::{MemoryApi, RestFileSystem, ServerConfig, TempDirStaging, WebDavServer};
//! use std::sync::Arc;
//!
//! let fs = RestFileSystem::new(Arc::new(MemoryApi::new()), Arc::new(TempDirStaging::system()));
//! let server = WebDavServer::start(fs, ServerConfig::default().with_port(5555)).await?;
//! println!("Mount via: {}/", server.url());
//! ```
//!
//! # Errors
//!
//! Every failure carries an [`ErrorKind`]; wrapping with context never
//! changes it, so [`RestFsError::is_not_found`] stays reliable.

mod backend;
mod dir_entry;
mod error;
mod file;
mod filesystem;
mod local;
mod memory;
mod metadata;
mod paths;
mod server;
mod staging;

// Public exports
pub use backend::{ContentSource, ContentStream, RestApi};
pub use dir_entry::RestDirEntry;
pub use error::{ApiError, ApiResult, ErrorKind, RestFsError, RestFsResult};
pub use file::{OpenFlags, RestFile};
pub use filesystem::RestFileSystem;
pub use local::LocalDirApi;
pub use memory::MemoryApi;
pub use metadata::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, EntryInfo, PendingFile, RestMetaData};
pub use server::{DEFAULT_PREFIX, ServerConfig, WebDavServer};
pub use staging::{MemoryStaging, StagingBuffer, StagingStore, TempDirStaging};
