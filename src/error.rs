//! Error types for the client library.
//!
//! Store and feed operations never hand these to their callers: remote
//! failures are logged and the cached copy is used instead. The errors
//! surface only from the explicit client calls (session, courses, import).

/// Errors from the REST backend layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("backend error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Backend `error` message, or the raw body when there is none.
        body: String,
    },

    /// No `access_token` is stored, so the call was not attempted.
    #[error("not logged in")]
    Unauthenticated,

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL cannot carry endpoint paths.
    #[error("invalid API base URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Errors from a [`KeyValueStore`](crate::storage::KeyValueStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from sign-in, sign-up and session checks.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Rejected(String),

    #[error("session expired")]
    Expired,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from bulk absence import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {message}")]
    InvalidRow { line: u64, message: String },
}
