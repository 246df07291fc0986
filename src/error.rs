use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Samplecue's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Samplecue's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
///
/// Runtime seek failures and misplaced-seek detections are *not* represented here: the
/// seek-and-verify state machine recovers from them internally and they never surface
/// to callers.
#[derive(Debug, Error)]
pub enum Error {
    /// The container could not be opened, probed, or the requested track is unusable.
    #[error("open error: {message}")]
    Open {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// The codec for the selected track could not be created or initialized.
    #[error("codec error: {message}")]
    Codec {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// The decoded stream uses a format the library cannot represent.
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },

    /// A caller-provided argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The indexing pass finished without producing any frames.
    #[error("index build failed: {message}")]
    IndexBuild { message: String },

    /// A long-running operation observed the cancellation token.
    ///
    /// The source is left in a defined but unusable state and must be dropped.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal contract was violated. This indicates a bug, not bad input.
    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl Error {
    pub(crate) fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn codec(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Codec {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn index_build(message: impl Into<String>) -> Self {
        Self::IndexBuild {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct AnyhowChainError {
    rendered: String,
}

impl fmt::Display for AnyhowChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl StdError for AnyhowChainError {}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other {
            message: err.to_string(),
            source: Some(Box::new(AnyhowChainError {
                rendered: format!("{err:#}"),
            })),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
