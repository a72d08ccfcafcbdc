//! Error handling for mstodo.
//!
//! Provides a unified error handling system based on gRPC status codes,
//! with mapping from the underlying transport, parsing and filesystem
//! errors to appropriate categories.
//!
//! # Error Categories
//!
//! * Authentication failures: rejected codes, expired refresh tokens (401, 403)
//! * Resource state: missing config file (404), port already bound (409)
//! * Client errors: malformed responses or config values (400)
//! * Server errors: token endpoint or list API failures (500, 503)
//! * Timeouts and cancellation: browser login never completed (499, 504)
//!
//! # Example
//!
//! ```rust
//! use mstodo::error::{Error, ErrorKind, Result};
//!
//! fn check(client_id: &str) -> Result<()> {
//!     if client_id.is_empty() {
//!         return Err(Error::invalid_argument("missing client_id"));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for mstodo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// HTTP Mapping: 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// HTTP Mapping: 504 Gateway Timeout
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP Mapping: 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// HTTP Mapping: 409 Conflict
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// HTTP Mapping: 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP Mapping: 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// HTTP Mapping: 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// HTTP Mapping: 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// HTTP Mapping: 501 Not Implemented
    #[error("not implemented")]
    Unimplemented = 12,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// HTTP Mapping: 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

macro_rules! constructor {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "config file not found");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    constructor!(
        /// Creates an error for operations that were interrupted mid-execution.
        aborted => Aborted
    );

    constructor!(
        /// Creates an error for duplicate resource creation attempts, such
        /// as binding a port that is already in use.
        already_exists => AlreadyExists
    );

    constructor!(
        /// Creates an error for cancelled operations.
        ///
        /// Use when the user interrupts a login that is waiting for the
        /// browser.
        cancelled => Cancelled
    );

    constructor!(
        /// Creates an error for data corruption or loss.
        data_loss => DataLoss
    );

    constructor!(
        /// Creates an error for operations that exceeded their deadline.
        ///
        /// Use when:
        /// * Network operation times out
        /// * The browser redirect never arrives
        deadline_exceeded => DeadlineExceeded
    );

    constructor!(
        /// Creates an error for operations that failed due to current state.
        failed_precondition => FailedPrecondition
    );

    constructor!(
        /// Creates an error for unexpected internal errors.
        internal => Internal
    );

    constructor!(
        /// Creates an error for invalid arguments, malformed responses and
        /// incomplete configuration.
        invalid_argument => InvalidArgument
    );

    constructor!(
        /// Creates an error for missing resources.
        not_found => NotFound
    );

    constructor!(
        /// Creates an error for permission denied conditions.
        permission_denied => PermissionDenied
    );

    constructor!(
        /// Creates an error for exhausted resources.
        resource_exhausted => ResourceExhausted
    );

    constructor!(
        /// Creates an error for authentication failures.
        ///
        /// Use when:
        /// * The authorization code is rejected
        /// * The refresh token has expired or was revoked
        /// * The list API refuses the access token
        unauthenticated => Unauthenticated
    );

    constructor!(
        /// Creates an error for unavailable services.
        unavailable => Unavailable
    );

    constructor!(
        /// Creates an error for unimplemented features.
        unimplemented => Unimplemented
    );

    constructor!(
        /// Creates an error for unknown errors.
        unknown => Unknown
    );

    /// Maps an unexpected HTTP status to an error kind.
    ///
    /// * 400 -> `InvalidArgument`
    /// * 401 -> `Unauthenticated`
    /// * 403 -> `PermissionDenied`
    /// * 404 -> `NotFound`
    /// * 409 -> `AlreadyExists`
    /// * 429 -> `ResourceExhausted`
    /// * 501 -> `Unimplemented`
    /// * 503 -> `Unavailable`
    /// * 504 -> `DeadlineExceeded`
    pub fn from_status<E>(status: http::StatusCode, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        use http::StatusCode;
        let kind = match status {
            StatusCode::BAD_REQUEST => ErrorKind::InvalidArgument,
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthenticated,
            StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::CONFLICT => ErrorKind::AlreadyExists,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::ResourceExhausted,
            StatusCode::NOT_IMPLEMENTED => ErrorKind::Unimplemented,
            StatusCode::SERVICE_UNAVAILABLE => ErrorKind::Unavailable,
            StatusCode::GATEWAY_TIMEOUT => ErrorKind::DeadlineExceeded,
            s if s.is_server_error() => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        };

        Self::new(kind, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// Maps standard IO errors to their logical equivalents:
/// * `NotFound` -> `NotFound`
/// * `PermissionDenied` -> `PermissionDenied`
/// * `AddrInUse` -> `AlreadyExists`
/// * `ConnectionReset` -> `Aborted`
/// * etc.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// * Body errors -> `DataLoss`
/// * Decode errors -> `InvalidArgument`
/// * Builder errors -> `Internal`
/// * Connect errors -> `Unavailable`
/// * Redirect loops -> `ResourceExhausted`
/// * Timeout errors -> `DeadlineExceeded`
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_connect() {
            return Self::unavailable(err);
        }

        if err.is_redirect() {
            return Self::resource_exhausted(err);
        }

        if err.is_status() {
            return Self::failed_precondition(err);
        }

        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors through IO error mapping.
///
/// Syntax and data errors end up as `InvalidArgument`, premature end of
/// input as `DataLoss`.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

/// Converts TOML parsing errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e)
    }
}

/// Converts TOML serialization errors to `Internal`.
impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::internal(e)
    }
}

/// Converts invalid header errors to `Internal`.
impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts URL parsing errors to `InvalidArgument`.
///
/// URLs are built from configuration values, so a parse failure points at
/// the config file rather than at the program.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts mutex poisoning errors to `Internal`.
impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for Error {
    fn from(e: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        Self::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_details() {
        let err = Error::not_found("config file missing");
        assert_eq!(err.to_string(), "not found: config file missing");
    }

    #[test]
    fn io_errors_map_to_kinds() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::AddrInUse));
        assert_eq!(err.kind, ErrorKind::AlreadyExists);

        let err = Error::from(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn json_errors_are_invalid_arguments() {
        let err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        assert_eq!(Error::from(err).kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn status_codes_map_to_kinds() {
        use http::StatusCode;
        assert_eq!(
            Error::from_status(StatusCode::UNAUTHORIZED, "x").kind,
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            Error::from_status(StatusCode::BAD_GATEWAY, "x").kind,
            ErrorKind::Internal
        );
        assert_eq!(
            Error::from_status(StatusCode::IM_A_TEAPOT, "x").kind,
            ErrorKind::Unknown
        );
    }
}
