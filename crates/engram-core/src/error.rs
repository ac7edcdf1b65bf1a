use std::error::Error as StdError;

/// Boxed error used to carry the underlying cause of a wrapped failure.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error taxonomy shared by every vector store backend.
///
/// Raw transport or vendor errors never reach callers directly: adapters wrap
/// them in [`VectorStoreError::Backend`] (preserving the cause) and connection
/// attempts that exhaust their retries surface as
/// [`VectorStoreError::Connection`].
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("vector store is not connected: {0}")]
    NotConnected(String),
    #[error("vector store error: {0}")]
    Store(String),
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("invalid filter: {0}")]
    Filter(String),
    #[error("payload codec error: {0}")]
    Codec(String),
    #[error("{backend} error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown memory type: {0}")]
    UnknownMemoryType(String),
}

impl VectorStoreError {
    pub fn connection(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Connection {
            message: message.into(),
            source,
        }
    }

    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error as a backend failure, keeping it as the cause.
    pub fn backend_with_source(
        backend: &'static str,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn transport(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Transport {
            message: message.into(),
            source,
        }
    }

    /// Re-tag a transport failure as a failure of `backend`.
    ///
    /// Other variants are returned unchanged.
    pub fn into_backend(self, backend: &'static str) -> Self {
        match self {
            Self::Transport { message, source } => Self::Backend {
                backend,
                message,
                source,
            },
            other => other,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_dimension(&self) -> bool {
        matches!(self, Self::Dimension { .. })
    }

    /// Caller bugs (bad dimensions, malformed filters, bad config) are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Connection { .. } | Self::Backend { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
