//! OAuth token endpoint response types.
//!
//! # Example Response
//!
//! ```json
//! {
//!     "token_type": "Bearer",
//!     "scope": "Tasks.ReadWrite",
//!     "expires_in": 3599,
//!     "ext_expires_in": 3599,
//!     "access_token": "secret_token",
//!     "refresh_token": "secret_refresh_token"
//! }
//! ```
//!
//! Failed exchanges come back with a non-2xx status and an [`AuthError`]
//! body instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// Result of a successful token exchange.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Serialize, Redact, Hash)]
pub struct AuthData {
    #[serde(default)]
    pub token_type: String,

    #[serde(default)]
    pub scope: String,

    /// Lifetime of `access_token`.
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in: Duration,

    /// Extended lifetime, used to derive how long `refresh_token` lives.
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    #[serde(default)]
    pub ext_expires_in: Duration,

    #[redact]
    pub access_token: String,

    #[redact]
    #[serde(default)]
    pub refresh_token: String,
}

/// Error body returned by the token endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct AuthError {
    pub error: String,

    #[serde(default)]
    pub error_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_response() {
        let body = r#"{
            "token_type": "Bearer",
            "scope": "Tasks.ReadWrite",
            "expires_in": 3599,
            "ext_expires_in": "3600",
            "access_token": "A",
            "refresh_token": "B"
        }"#;

        let data: AuthData = serde_json::from_str(body).unwrap();
        assert_eq!(data.token_type, "Bearer");
        assert_eq!(data.expires_in, Duration::from_secs(3599));
        assert_eq!(data.ext_expires_in, Duration::from_secs(3600));
        assert_eq!(data.access_token, "A");
        assert_eq!(data.refresh_token, "B");
    }

    #[test]
    fn optional_fields_default() {
        let data: AuthData =
            serde_json::from_str(r#"{"expires_in": 10, "access_token": "A"}"#).unwrap();
        assert_eq!(data.ext_expires_in, Duration::ZERO);
        assert!(data.refresh_token.is_empty());
        assert!(data.scope.is_empty());
    }

    #[test]
    fn access_token_is_required() {
        assert!(serde_json::from_str::<AuthData>(r#"{"expires_in": 10}"#).is_err());
    }

    #[test]
    fn debug_output_hides_tokens() {
        let data: AuthData = serde_json::from_str(
            r#"{"expires_in": 10, "access_token": "hidden-a", "refresh_token": "hidden-b"}"#,
        )
        .unwrap();
        let debug = format!("{data:?}");
        assert!(!debug.contains("hidden-a"));
        assert!(!debug.contains("hidden-b"));
    }
}
