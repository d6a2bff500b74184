//! GitHub API error handling.

use thiserror::Error;

/// GitHub API specific errors.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The API answered with a status that is neither success, a definitive
    /// miss, nor a rate limit.
    #[error("GitHub API request failed: HTTP {status} for {url}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Response body, possibly empty.
        body: String,
    },

    /// A rate-limit status arrived while the quota was not exhausted.
    #[error("Invalid HTTP {status} response while {remaining} requests remain in the rate limit")]
    InvalidRateLimitState {
        /// HTTP status code.
        status: u16,
        /// Remaining quota reported by the API.
        remaining: u64,
    },

    /// The request could not be delivered.
    #[error("Network error after {attempts} attempts: {message}")]
    Network {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last transport error.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("Invalid response format from GitHub API: {0}")]
    InvalidResponseFormat(String),
}
