//! Error types for GraphModel operations.

use std::fmt;

/// The primary error type for all GraphModel operations.
#[derive(Debug)]
pub enum Error {
    /// A temporary reference has no entry in the store's placeholder mapping
    UnresolvedReference(UnresolvedReferenceError),
    /// A reference string is neither a temporary token nor a permanent id
    MalformedReference(MalformedReferenceError),
    /// The caller used the mapping layer out of order
    Usage(UsageError),
    /// The backing store failed to execute or answer a request
    Store(StoreError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// A temporary token that the store response did not map to a permanent id.
///
/// This is a protocol mismatch between the write request and its response and
/// is never retried locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReferenceError {
    /// The token as it appeared in the write request (e.g. `_n3`).
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReferenceError {
    /// The offending input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    pub message: String,
}

#[derive(Debug)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The store could not be reached
    Unavailable,
    /// The store rejected the write request
    Rejected,
    /// The request referenced an entity the store does not know
    NotFound,
    /// The operation was aborted before the store answered
    Aborted,
}

impl UsageError {
    /// Create a usage error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl StoreError {
    /// Create a store error without an underlying cause.
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl Error {
    /// Shorthand for an [`Error::UnresolvedReference`].
    pub fn unresolved(token: impl fmt::Display) -> Self {
        Error::UnresolvedReference(UnresolvedReferenceError {
            token: token.to_string(),
        })
    }

    /// Shorthand for an [`Error::MalformedReference`].
    pub fn malformed(input: impl Into<String>, reason: &'static str) -> Self {
        Error::MalformedReference(MalformedReferenceError {
            input: input.into(),
            reason,
        })
    }

    /// Shorthand for an [`Error::Usage`].
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(UsageError::new(message))
    }

    /// Errors that indicate the request and the response disagree, or that the
    /// caller misused the API. Retrying the same save cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedReference(_) | Error::MalformedReference(_) | Error::Usage(_)
        )
    }

    /// Is this a transient store failure that a caller may retry with a fresh
    /// change-set?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store(e) => matches!(
                e.kind,
                StoreErrorKind::Unavailable | StoreErrorKind::Aborted
            ),
            _ => false,
        }
    }

    /// The unresolved token, if this is an [`Error::UnresolvedReference`].
    pub fn unresolved_token(&self) -> Option<&str> {
        match self {
            Error::UnresolvedReference(e) => Some(&e.token),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnresolvedReference(e) => write!(f, "Unresolved reference: {}", e),
            Error::MalformedReference(e) => write!(f, "Malformed reference: {}", e),
            Error::Usage(e) => write!(f, "Usage error: {}", e.message),
            Error::Store(e) => write!(f, "Store error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for UnresolvedReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no identity returned for '{}'", self.token)
    }
}

impl fmt::Display for MalformedReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.input, self.reason)
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UnresolvedReferenceError {}
impl std::error::Error for MalformedReferenceError {}
impl std::error::Error for UsageError {}

impl From<UnresolvedReferenceError> for Error {
    fn from(err: UnresolvedReferenceError) -> Self {
        Error::UnresolvedReference(err)
    }
}

impl From<MalformedReferenceError> for Error {
    fn from(err: MalformedReferenceError) -> Self {
        Error::MalformedReference(err)
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::Usage(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for GraphModel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_and_retryable_flags() {
        assert!(Error::unresolved("_n1").is_fatal());
        assert!(Error::malformed("x1", "unknown prefix").is_fatal());
        assert!(Error::usage("purge during change-set").is_fatal());

        let unavailable = Error::Store(StoreError::new(
            StoreErrorKind::Unavailable,
            "connection refused",
        ));
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_fatal());

        let rejected = Error::Store(StoreError::new(StoreErrorKind::Rejected, "constraint"));
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn display_names_the_token() {
        let err = Error::unresolved("_r7");
        assert_eq!(err.unresolved_token(), Some("_r7"));
        assert_eq!(
            err.to_string(),
            "Unresolved reference: no identity returned for '_r7'"
        );

        let err = Error::malformed("#12", "unknown prefix");
        assert_eq!(err.to_string(), "Malformed reference: '#12' (unknown prefix)");
    }

    #[test]
    fn store_error_exposes_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = StoreError::new(StoreErrorKind::Unavailable, "write failed")
            .with_source(io)
            .into();
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Store error: write failed");
    }

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<i64>("not a number").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Serde(_)));
    }
}
