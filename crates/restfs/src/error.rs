//! Error handling and mapping for the REST adapter.
//!
//! Backends report failures as [`ApiError`]. The adapter wraps them in
//! [`RestFsError`], which carries an explicit [`ErrorKind`] next to a
//! human-readable context chain. Adding context never changes the kind, so
//! "is this a not-found?" answers the same after any number of layers.
//!
//! [`RestFsError`] converts into the dav-server [`FsError`] that the WebDAV
//! engine turns into HTTP status codes.

use dav_server::fs::FsError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors reported by a [`RestApi`](crate::RestApi) implementation.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The named object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The named object already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The backend refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A directory operation targeted a non-directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A content operation targeted a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Transport or local IO failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Any other failure reported by the remote side.
    #[error("remote error: {0}")]
    Remote(String),
}

impl ApiError {
    /// Classify an IO error for the named object.
    ///
    /// Not-found, exists and permission failures keep their meaning; anything
    /// else is carried as [`ApiError::Io`].
    pub fn from_io(name: &str, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => ApiError::NotFound(name.to_string()),
            io::ErrorKind::AlreadyExists => ApiError::AlreadyExists(name.to_string()),
            io::ErrorKind::PermissionDenied => ApiError::PermissionDenied(name.to_string()),
            io::ErrorKind::NotADirectory => ApiError::NotADirectory(name.to_string()),
            io::ErrorKind::IsADirectory => ApiError::IsADirectory(name.to_string()),
            _ => ApiError::Io(e),
        }
    }

    /// Returns true if this error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::NotFound(_) => true,
            ApiError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    fn kind(&self) -> ErrorKind {
        if self.is_not_found() {
            return ErrorKind::NotFound;
        }
        match self {
            ApiError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ApiError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ApiError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            _ => ErrorKind::Backend,
        }
    }
}

/// Result type for backend calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Classification of an adapter failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The object is absent.
    NotFound,
    /// The object already exists (exclusive create, mkdir).
    AlreadyExists,
    /// The backend refused the operation.
    PermissionDenied,
    /// Any other backend failure (network, malformed response, ...).
    Backend,
    /// Local staging storage could not be allocated, written or read.
    LocalStaging,
    /// The caller asked for something impossible, e.g. a negative offset.
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Backend => "backend failure",
            ErrorKind::LocalStaging => "local staging failure",
            ErrorKind::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}

/// Error returned by every adapter operation.
///
/// The `kind` is fixed when the error is created from its cause and is kept
/// by [`RestFsError::context`].
#[derive(Debug)]
pub struct RestFsError {
    kind: ErrorKind,
    context: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RestFsError {
    /// Wrap a backend failure.
    pub fn backend(context: impl Into<String>, source: ApiError) -> Self {
        Self {
            kind: source.kind(),
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a local staging failure.
    pub fn staging(context: impl Into<String>, source: io::Error) -> Self {
        Self {
            kind: ErrorKind::LocalStaging,
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// An invalid-argument failure without an underlying cause.
    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            context: context.into(),
            source: None,
        }
    }

    /// An error of the given kind without an underlying cause.
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    /// Prepend another layer of context, keeping the kind.
    #[must_use]
    pub fn context(mut self, context: impl fmt::Display) -> Self {
        self.context = format!("{context}: {}", self.context);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Converts this error to a dav-server FsError.
    pub fn to_fs_error(&self) -> FsError {
        match self.kind {
            ErrorKind::NotFound => FsError::NotFound,
            ErrorKind::AlreadyExists => FsError::Exists,
            ErrorKind::PermissionDenied => FsError::Forbidden,
            ErrorKind::Backend | ErrorKind::LocalStaging | ErrorKind::InvalidArgument => {
                FsError::GeneralFailure
            }
        }
    }
}

impl fmt::Display for RestFsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.context),
            None => write!(f, "{} ({})", self.context, self.kind),
        }
    }
}

impl std::error::Error for RestFsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<RestFsError> for FsError {
    fn from(e: RestFsError) -> Self {
        if e.is_not_found() {
            tracing::debug!(error = %e, "Not found");
        } else {
            tracing::warn!(error = %e, "Operation failed");
        }
        e.to_fs_error()
    }
}

/// Result type for adapter operations.
pub type RestFsResult<T> = Result<T, RestFsError>;
