//! Error types for libctr
//!
//! Every fallible operation in the library returns [`CtrError`]. The variants
//! follow the classes callers need to branch on (not found, already exists,
//! invalid argument, ...) rather than the place the error came from, so the
//! CLI can decide between warning and failing without string matching.

use std::path::PathBuf;
use thiserror::Error;


/// Main error type for libctr operations
#[derive(Error, Debug)]
pub enum CtrError {
    /// The named resource does not exist
    #[error("{resource_type} {name}: not found")]
    NotFound { resource_type: String, name: String },

    /// The named resource already exists
    #[error("{resource_type} {name}: already exists")]
    AlreadyExists { resource_type: String, name: String },

    /// Caller supplied a malformed argument (filter, field path, platform, ...)
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The operation cannot run in the current state
    #[error("failed precondition: {message}")]
    FailedPrecondition { message: String },

    /// The operation is not implemented by this backend
    #[error("not supported: {message}")]
    Unsupported { message: String },

    /// Content failed validation (digest mismatch, bad manifest, ...)
    #[error("{message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A background task failed to complete
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Filesystem errors
    #[error("{message}: {}", path.display())]
    Io {
        message: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for libctr operations
pub type Result<T> = std::result::Result<T, CtrError>;

impl CtrError {
    /// Creates a new not found error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libctr::error::CtrError;
    ///
    /// let err = CtrError::not_found("image", "docker.io/library/alpine:latest");
    /// assert!(err.is_not_found());
    /// ```
    pub fn not_found<S: Into<String>, N: Into<String>>(resource_type: S, name: N) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Creates a new already exists error.
    pub fn already_exists<S: Into<String>, N: Into<String>>(resource_type: S, name: N) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a new failed precondition error.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::FailedPrecondition {
            message: message.into(),
        }
    }

    /// Creates a new unsupported error.
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libctr::error::CtrError;
    ///
    /// let err = CtrError::validation("invalid manifest format");
    /// assert!(matches!(err, CtrError::Validation { .. }));
    /// ```
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new validation error with a source error.
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new I/O error for the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// use libctr::error::CtrError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
    /// let err = CtrError::io("failed to open blob", "/var/lib/ctr/content", io_err);
    /// assert!(matches!(err, CtrError::Io { .. }));
    /// ```
    pub fn io<S, P>(message: S, path: P, source: std::io::Error) -> Self
    where
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self::Io {
            message: message.into(),
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors reporting a missing resource.
    ///
    /// I/O errors with [`std::io::ErrorKind::NotFound`] count as well, so a
    /// blob vanishing between a probe and a read is classified the same way
    /// as a blob that was never there.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true for errors reporting a duplicate resource.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<oci_spec::OciSpecError> for CtrError {
    fn from(err: oci_spec::OciSpecError) -> Self {
        CtrError::validation_with_source("invalid OCI object", err)
    }
}

impl From<serde_json::Error> for CtrError {
    fn from(err: serde_json::Error) -> Self {
        CtrError::validation_with_source("failed to decode JSON", err)
    }
}
