//! Application error types for workspace-sync
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling. The remote
//! API surface has its own taxonomy (`ApiError`) because retry and
//! circuit-breaker decisions are made per error kind.

use thiserror::Error;

/// Classification of a remote API error, used by retry policies and the
/// circuit breaker to decide eligibility without matching on payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// Request rejected by remote validation (HTTP 400)
    Validation,
    /// Missing or invalid credentials (HTTP 401)
    Authentication,
    /// Authenticated but not allowed (HTTP 403)
    Permission,
    /// Resource does not exist (HTTP 404)
    NotFound,
    /// Remote asked us to slow down (HTTP 429)
    RateLimited,
    /// Remote-side failure (HTTP 5xx)
    Server,
    /// Request timed out in transit
    Timeout,
    /// Connection-level failure
    Network,
    /// Call rejected locally because the circuit breaker is open
    CircuitOpen,
    /// Response body could not be interpreted
    InvalidResponse,
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ApiErrorKind::Validation => "validation",
            ApiErrorKind::Authentication => "authentication",
            ApiErrorKind::Permission => "permission",
            ApiErrorKind::NotFound => "not_found",
            ApiErrorKind::RateLimited => "rate_limited",
            ApiErrorKind::Server => "server_error",
            ApiErrorKind::Timeout => "timeout",
            ApiErrorKind::Network => "network",
            ApiErrorKind::CircuitOpen => "circuit_open",
            ApiErrorKind::InvalidResponse => "invalid_response",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ApiErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(ApiErrorKind::Validation),
            "authentication" => Ok(ApiErrorKind::Authentication),
            "permission" => Ok(ApiErrorKind::Permission),
            "not_found" => Ok(ApiErrorKind::NotFound),
            "rate_limited" => Ok(ApiErrorKind::RateLimited),
            "server_error" => Ok(ApiErrorKind::Server),
            "timeout" => Ok(ApiErrorKind::Timeout),
            "network" => Ok(ApiErrorKind::Network),
            "circuit_open" => Ok(ApiErrorKind::CircuitOpen),
            "invalid_response" => Ok(ApiErrorKind::InvalidResponse),
            _ => Err(format!("Unknown error kind: {}", s)),
        }
    }
}

/// Errors surfaced by the workspace API client
///
/// Every HTTP outcome maps to exactly one variant; transport failures map to
/// `Timeout` or `Network`. The client never mutates local state, so these
/// carry no partial-write information.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// Request rejected by remote validation, with field detail when the
    /// response body names the offending property
    #[error("Validation failed: {message}")]
    Validation {
        /// Human-readable message from the remote service
        message: String,
        /// Offending field, if the response identified one
        field: Option<String>,
    },

    /// Missing or invalid credentials
    #[error("Authentication failed")]
    Authentication,

    /// Authenticated but not permitted to access the resource
    #[error("Permission denied")]
    Permission,

    /// Resource does not exist on the remote side
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Remote rate limit hit; carries the server's Retry-After guidance
    #[error("Rate limited by remote service")]
    RateLimited {
        /// Seconds to wait, from the Retry-After header when present
        retry_after_secs: Option<u64>,
    },

    /// Remote-side failure
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Rejected locally: the circuit breaker is open
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    /// Response body could not be parsed into the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// The kind of this error, for policy matching
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::Validation { .. } => ApiErrorKind::Validation,
            ApiError::Authentication => ApiErrorKind::Authentication,
            ApiError::Permission => ApiErrorKind::Permission,
            ApiError::NotFound(_) => ApiErrorKind::NotFound,
            ApiError::RateLimited { .. } => ApiErrorKind::RateLimited,
            ApiError::Server(_) => ApiErrorKind::Server,
            ApiError::Timeout => ApiErrorKind::Timeout,
            ApiError::Network(_) => ApiErrorKind::Network,
            ApiError::CircuitOpen(_) => ApiErrorKind::CircuitOpen,
            ApiError::InvalidResponse(_) => ApiErrorKind::InvalidResponse,
        }
    }

    /// The HTTP status this error corresponds to, when one exists
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Validation { .. } => Some(400),
            ApiError::Authentication => Some(401),
            ApiError::Permission => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server(code) => Some(*code),
            _ => None,
        }
    }

    /// Server-provided Retry-After guidance in seconds, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Synchronization-level errors
///
/// These are run-level failures. Per-page failures during a sync are not
/// errors at this level; they accumulate into the SyncRun's error list.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote API failure that escaped the per-page handlers
    #[error("Workspace API error: {0}")]
    Api(#[from] ApiError),

    /// Local storage failure
    #[error("Storage error: {0}")]
    Store(#[from] DbError),

    /// Lease acquisition or release failure
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Shared coordination store failure
    #[error("State store error: {0}")]
    State(#[from] StateError),

    /// Registered database exists but is deactivated
    #[error("Database {0} is not active")]
    DatabaseInactive(String),

    /// No database registered under the given identifier
    #[error("Database {0} not found")]
    DatabaseNotFound(String),

    /// Another sync run holds the lease for this database
    #[error("Sync already running for database {0}")]
    AlreadyRunning(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection-task failure (closed channel, panicked closure)
    #[error("Database task error: {0}")]
    Task(String),

    /// Record not found
    #[error("Record not found")]
    NotFound,

    /// Stored JSON column could not be decoded
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<tokio_rusqlite::Error> for DbError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => DbError::Sqlite(e),
            other => DbError::Task(other.to_string()),
        }
    }
}

/// Errors from the shared coordination state store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// Backend failure (connection loss, I/O)
    #[error("State store backend error: {0}")]
    Backend(String),

    /// Stored snapshot could not be decoded
    #[error("State serialization error: {0}")]
    Serialization(String),
}

/// Lease acquisition and release errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LockError {
    /// Release attempted with a token that does not own the lease
    #[error("Lease not held by this token")]
    NotHeld,

    /// Underlying state store failure
    #[error("State store error: {0}")]
    State(#[from] StateError),
}

/// Application-level error type
///
/// Aggregates all domain-specific error types. Handlers at the boundary map
/// this into structured `{error, message}` responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Remote API error
    #[error("Workspace API error: {0}")]
    Api(#[from] ApiError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Coordination store error
    #[error("State store error: {0}")]
    State(#[from] StateError),

    /// Lock error
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            ApiError::Network(_) => true,
            ApiError::Timeout => true,
            ApiError::RateLimited { .. } => true,
            ApiError::Server(code) if *code >= 500 => true,

            // Non-retryable errors
            ApiError::Server(_) => false,
            ApiError::Validation { .. } => false,
            ApiError::Authentication => false,
            ApiError::Permission => false,
            ApiError::NotFound(_) => false,
            ApiError::CircuitOpen(_) => false,
            ApiError::InvalidResponse(_) => false,
        }
    }
}
