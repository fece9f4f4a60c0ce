/*!
 * Error types for the bgasync application.
 *
 * This module contains the error taxonomy of the synchronization engine,
 * using the thiserror crate for ergonomic error definitions:
 * - `DriverError`: faults reported by the remote surface (HTTP or form driver)
 * - `AuthError`: the login handshake could not produce a session
 * - `LoadError`: local inputs (translation table, metadata) are unusable
 * - `PaginationError`: the paginated listing could not be walked
 * - `UnitError`: a single unit could not be written
 * - `SyncError`: run-level errors that abort a synchronization
 */

use std::path::PathBuf;
use thiserror::Error;

/// Faults reported while talking to the remote editing surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// Error when making a request fails
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The operation did not complete within its deadline
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    /// Error when parsing a response fails
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Error status returned by the remote system
    #[error("Remote responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the remote
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The remote asked us to slow down
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Error message from the remote
        message: String,
        /// Seconds to wait before retrying, if the remote said so
        retry_after_secs: Option<u64>,
    },

    /// The remote rejected our credentials or session
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// A form field could not be located on the current page
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// A written value did not read back as expected
    #[error("Verification failed for {field_id}: expected {expected:?}, found {found:?}")]
    VerificationFailed {
        /// Field that was written
        field_id: String,
        /// Value we wrote
        expected: String,
        /// Value read back, if any
        found: Option<String>,
    },
}

impl DriverError {
    /// Whether the fault is worth retrying under the retry policy
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::Timeout(_)
            | Self::ParseError(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded { .. }
            | Self::FieldNotFound(_)
            | Self::VerificationFailed { .. } => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::AuthenticationError(_) => false,
        }
    }

    /// Whether the fault means the session is no longer accepted
    pub fn is_auth_rejection(&self) -> bool {
        match self {
            Self::AuthenticationError(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 401 || *status_code == 403,
            _ => false,
        }
    }

    /// Server-supplied wait hint, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Errors that prevent a session from being established
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// The entry page never exposed a request token
    #[error("Request token not found after {attempts} attempts")]
    TokenNotFound {
        /// Attempts made
        attempts: u32,
    },

    /// The remote explicitly refused the credentials
    #[error("Login rejected: {message}")]
    Rejected {
        /// Error message from the remote
        message: String,
    },

    /// Transient faults persisted past the retry ceiling
    #[error("Login failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// The last fault observed
        last_error: String,
    },

    /// A freshly renewed session was rejected again
    #[error("Session rejected again after logging in: {0}")]
    SessionRejected(String),

    /// Username check failed before login
    #[error("Username check failed: {0}")]
    UsernameCheck(String),

    /// Credentials were missing from the environment
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The run was cancelled while authenticating
    #[error("Authentication cancelled")]
    Cancelled,
}

/// Errors that occur while loading local inputs
#[derive(Error, Debug)]
pub enum LoadError {
    /// The file could not be read
    #[error("Failed to read {path:?}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file was readable but its content is unusable
    #[error("Malformed {path:?}: {message}")]
    Malformed {
        /// Path that failed
        path: PathBuf,
        /// What was wrong
        message: String,
    },

    /// The translation table holds no usable rows
    #[error("Translation table {0:?} contains no translations")]
    EmptyTable(PathBuf),
}

/// Errors while walking the paginated listing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaginationError {
    /// A page could not be fetched within the retry ceiling
    #[error("Failed to fetch page {cursor} after {attempts} attempts: {message}")]
    FetchFailed {
        /// Cursor that was being fetched
        cursor: String,
        /// Attempts made
        attempts: u32,
        /// The last fault observed
        message: String,
    },

    /// The pagination control disagrees with the listing
    #[error("Inconsistent pagination at {cursor}: {message}")]
    Inconsistent {
        /// Cursor of the page with the bad control
        cursor: String,
        /// What was wrong
        message: String,
    },

    /// The session was rejected and could not be re-established
    #[error("Session lost while fetching {cursor}: {source}")]
    SessionLost {
        /// Cursor that was being fetched
        cursor: String,
        /// Why re-authentication failed
        #[source]
        source: AuthError,
    },

    /// The run was cancelled during a page fetch
    #[error("Page fetch cancelled")]
    Cancelled,
}

impl PaginationError {
    /// Whether the error must abort the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Inconsistent { .. })
    }
}

/// A single unit could not be written; recorded, never escalated
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unit {unit_id} failed after {attempts} attempts: {message}")]
pub struct UnitError {
    /// Remote identifier of the unit
    pub unit_id: String,
    /// Cursor of the page the unit came from
    pub cursor: String,
    /// Attempts made
    pub attempts: u32,
    /// The last fault observed
    pub message: String,
}

/// Errors that abort a synchronization run
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local inputs could not be loaded
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// No session could be established
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The listing could not be walked
    #[error("Pagination error: {0}")]
    Pagination(#[from] PaginationError),

    /// A fatal remote fault outside pagination
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// The run was cancelled
    #[error("Synchronization cancelled")]
    Cancelled,
}
