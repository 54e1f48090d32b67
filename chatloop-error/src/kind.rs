//! Error kinds for chatloop operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to handle a failed run, e.g.
/// surface `AuthenticationFailed` to the user but back off on `RateLimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration (missing API key, bad base URL, ...)
    ConfigInvalid,

    // =========================================================================
    // Encoding errors
    // =========================================================================
    /// Failed to parse input (e.g. a function-call argument payload)
    ParseFailed,

    /// Serialization/deserialization of a typed value failed
    SerializationFailed,

    // =========================================================================
    // Function errors
    // =========================================================================
    /// A registered function failed while running
    FunctionFailed,

    // =========================================================================
    // Completion service errors
    // =========================================================================
    /// The completion service returned an error or an unusable response
    InferenceFailed,

    /// Network error talking to the completion service
    NetworkFailed,

    /// Rate limit exceeded
    RateLimited,

    /// The completion service rejected the credentials
    AuthenticationFailed,

    /// Provider not available
    ProviderUnavailable,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            // Encoding
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // Function
            ErrorKind::FunctionFailed => "FunctionFailed",

            // Completion service
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
