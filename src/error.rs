//! Unified error handling for the mergeq library.
//!
//! This module provides the error hierarchy using `thiserror` for
//! programmatic error handling and informative error messages.
//!
//! ## Error Categories
//!
//! - [`ApiError`]: Errors from GitHub API interactions
//! - [`GitError`]: Errors from git subprocess operations
//! - [`ConfigError`]: Errors from configuration loading and validation
//! - [`SelectionError`]: Illegal label states detected while picking a candidate
//! - [`MergeError`]: Errors while resolving or executing a merge
//!
//! ## Example
//!
//! ```rust,no_run
//! use mergeq::error::{MergeqError, ApiError};
//!
//! fn example() -> Result<(), MergeqError> {
//!     // Errors are automatically converted via From trait
//!     Err(ApiError::Unauthorized)?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the mergeq library.
///
/// This enum encompasses all possible errors that can occur during
/// a processing cycle: API calls, git operations, configuration
/// handling and the decision engine itself.
#[derive(Error, Debug)]
pub enum MergeqError {
    /// An error occurred while interacting with the GitHub API.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// An error occurred during a git operation.
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// An error occurred while loading or validating configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The label state of the queue is ambiguous or illegal.
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// An error occurred while resolving or executing a merge.
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// A generic error for cases not covered by specific error types.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors that can occur when interacting with the GitHub API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The API request was unauthorized (401).
    #[error("Unauthorized: invalid or expired access token")]
    Unauthorized,

    /// The requested resource was not found (404).
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the resource that was not found.
        resource: String,
    },

    /// The API returned an error response.
    #[error("API request failed with status {status}: {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Failed to parse the API response.
    #[error("Failed to parse API response: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },

    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Exceeded maximum pagination requests.
    #[error("Exceeded maximum requests ({max}) while fetching data, retrieved {retrieved} items")]
    PaginationLimitExceeded {
        /// Maximum allowed requests.
        max: usize,
        /// Number of items retrieved before the limit was hit.
        retrieved: usize,
    },
}

/// Errors that can occur during git subprocess operations.
#[derive(Error, Debug, Clone)]
pub enum GitError {
    /// A git command exited with a non-zero status.
    #[error("Git command failed: {command} - {message}")]
    CommandFailed {
        /// The git command that failed.
        command: String,
        /// Error output from git.
        message: String,
    },

    /// The git binary could not be executed at all.
    #[error("Failed to spawn git: {message}")]
    SpawnFailed {
        /// Underlying I/O error message.
        message: String,
    },

    /// A clone operation failed.
    #[error("Failed to clone repository: {message}")]
    CloneFailed {
        /// Error message from git.
        message: String,
    },

    /// A fetch operation failed.
    #[error("Failed to fetch {refspec}: {message}")]
    FetchFailed {
        /// The refspec that was being fetched.
        refspec: String,
        /// Error message from git.
        message: String,
    },

    /// A push operation failed.
    #[error("Failed to push branch {branch}: {message}")]
    PushFailed {
        /// The branch that was being pushed.
        branch: String,
        /// Error message from git.
        message: String,
    },

    /// Invalid git reference (contains invalid characters).
    #[error("Invalid git reference '{reference}': contains forbidden characters")]
    InvalidReference {
        /// The invalid reference string.
        reference: String,
    },
}

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration field is missing.
    #[error("{field} is required")]
    MissingRequired {
        /// Name of the missing field.
        field: String,
    },

    /// Failed to read the configuration file.
    #[error("Failed to read config file at {path}: {message}")]
    FileReadError {
        /// Path to the config file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file at {path}: {message}")]
    ParseError {
        /// Path to the config file.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// An invalid value was provided for a configuration field.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Name of the field with invalid value.
        field: String,
        /// Description of why the value is invalid.
        message: String,
    },
}

/// Illegal label states detected while selecting the candidate PR.
///
/// These are hard errors surfaced to the operator rather than
/// auto-corrected: the recovery is ambiguous and a human must untangle
/// the labels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// More than one pull request carries the fast-forward override label.
    #[error("multiple pull requests carry an exclusive fast-forward label: {numbers:?}")]
    MultipleExclusiveLabels {
        /// The conflicting PR numbers.
        numbers: Vec<u64>,
    },

    /// More than two pull requests carry the in-progress mutex label.
    #[error("illegal state: multiple pull requests with the label: {label}")]
    TooManyInProgress {
        /// The mutex label name.
        label: String,
    },
}

/// Errors while resolving the merge method or executing a merge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// A PR carries more than one merge-method override label.
    #[error("too many custom merge method labels: {labels:?}")]
    AmbiguousMergeMethod {
        /// The conflicting label names.
        labels: Vec<String>,
    },

    /// The configured default merge method is not a known method.
    #[error("unknown merge method: {method}")]
    UnknownMethod {
        /// The unrecognized method string.
        method: String,
    },

    /// A fast-forward merge was requested for an out-of-date branch.
    #[error("the use of the merge method [ff] is impossible when a branch is not up-to-date")]
    FastForwardOutOfDate,

    /// The platform refused the merge.
    #[error("failed to merge pull request: {message}")]
    NotMerged {
        /// Failure message returned by the platform.
        message: String,
    },
}

/// Type alias for Results using MergeqError.
///
/// Note: This is not re-exported from the crate root to avoid shadowing `anyhow::Result`.
/// Use explicitly as `error::Result<T>` when needed.
pub type MergeqResult<T> = std::result::Result<T, MergeqError>;
