use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use tracing_error::SpanTrace;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What went wrong, independent of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The object or bucket does not exist.
    NotFound,

    /// The backend refused the operation.
    PermissionDenied,

    /// The backend failed while reading or writing; possibly transient.
    Io,

    /// The request can never succeed, e.g. a path escaping the bucket.
    InvalidRequest,

    /// Anything else.
    Other,
}

impl StorageErrorKind {
    /// Whether retrying the same operation might succeed.
    ///
    /// Advisory: the storage layer itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorKind::Io)
    }

    /// The kind matching an I/O error.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput => StorageErrorKind::InvalidRequest,
            _ => StorageErrorKind::Io,
        }
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::PermissionDenied => "permission denied",
            StorageErrorKind::Io => "I/O error",
            StorageErrorKind::InvalidRequest => "invalid request",
            StorageErrorKind::Other => "other error",
        })
    }
}

/// A failed storage operation.
///
/// Carries the [`StorageErrorKind`], the backend and object involved, and the
/// backtrace and span trace at the point of failure.
///
/// ```rust
/// use storage_driver::{StorageError, StorageErrorKind};
///
/// let error = StorageError::builder(
///     "local",
///     StorageErrorKind::NotFound,
///     std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
/// )
/// .bucket("registry")
/// .path("v2/blobs/sha256/ab/abcd/data")
/// .build();
///
/// assert!(error.is_not_found());
/// ```
#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    engine: &'static str,
    bucket: Option<String>,
    path: Option<String>,
    context: Option<String>,
    source: BoxError,
    backtrace: Box<Backtrace>,
    span_trace: SpanTrace,
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl StorageError {
    /// An error without object context.
    pub fn new<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::builder(engine, kind, error).build()
    }

    /// An error from an I/O failure, keeping its kind.
    pub fn from_io(engine: &'static str, error: io::Error) -> Self {
        Self::new(engine, StorageErrorKind::from_io(&error), error)
    }

    /// The object at `path` in `bucket` does not exist.
    pub fn not_found(engine: &'static str, bucket: &str, path: &str) -> Self {
        Self::builder(
            engine,
            StorageErrorKind::NotFound,
            io::Error::new(io::ErrorKind::NotFound, format!("no object at {path}")),
        )
        .bucket(bucket)
        .path(path)
        .build()
    }

    /// Start an error which records the bucket, path or other context.
    pub fn builder<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> StorageErrorBuilder
    where
        E: Into<BoxError>,
    {
        StorageErrorBuilder {
            error: StorageError {
                kind,
                engine,
                bucket: None,
                path: None,
                context: None,
                source: error.into(),
                backtrace: Box::new(Backtrace::capture()),
                span_trace: SpanTrace::capture(),
            },
        }
    }

    /// What went wrong.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Absence of an object or bucket, as opposed to a failure.
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }

    /// The backend which failed.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// The bucket involved, if recorded.
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// The object path involved, if recorded.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The failed operation, if recorded.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// See [`StorageErrorKind::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Backtrace at construction, if `RUST_BACKTRACE` enabled capture.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// The tracing spans active at construction.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} storage: {}", self.engine, self.kind)?;

        match (&self.bucket, &self.path) {
            (Some(bucket), Some(path)) => write!(f, " at {bucket}:{path}")?,
            (Some(bucket), None) => write!(f, " in bucket {bucket}")?,
            (None, Some(path)) => write!(f, " at {path}")?,
            (None, None) => {}
        }

        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Adds object context to a [`StorageError`].
#[derive(Debug)]
pub struct StorageErrorBuilder {
    error: StorageError,
}

impl StorageErrorBuilder {
    /// Record the bucket involved.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.error.bucket = Some(bucket.into());
        self
    }

    /// Record the object path involved.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.error.path = Some(path.into());
        self
    }

    /// Free-form description of the failed operation.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.error.context = Some(context.into());
        self
    }

    /// Finish the error.
    pub fn build(self) -> StorageError {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_not_found() {
        let err = StorageError::from_io("test", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());

        let err = StorageError::from_io("test", io::Error::other("disk on fire"));
        assert_eq!(err.kind(), StorageErrorKind::Io);
        assert!(err.is_retryable());
    }

    #[test]
    fn display_names_the_object() {
        let err = StorageError::not_found("memory", "registry", "v2/blobs/x");
        assert_eq!(
            err.to_string(),
            "memory storage: not found at registry:v2/blobs/x: no object at v2/blobs/x"
        );
        assert_eq!(err.bucket(), Some("registry"));
    }

    #[test]
    fn context_is_displayed() {
        let err = StorageError::builder("local", StorageErrorKind::Io, "short write")
            .context("upload")
            .build();
        assert_eq!(err.to_string(), "local storage: I/O error (upload): short write");
    }
}
