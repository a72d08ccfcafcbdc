//! Wire types for the services mstodo talks to.
//!
//! # Submodules
//!
//! * [`auth`] - OAuth token endpoint responses
//! * [`todo`] - Microsoft To Do task lists
//!
//! The module also provides [`json`], which parses a response body and logs
//! it for protocol analysis.

pub mod auth;
pub mod todo;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs a JSON response body.
///
/// # Arguments
///
/// * `body` - Response body to parse
/// * `origin` - Description of the endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs the top-level keys at TRACE level if valid JSON
/// * Invalid JSON: Logs error at ERROR level
pub fn json<T>(body: &[u8], origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_slice(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            // Token responses carry secrets, so only the shape is logged.
            if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
                let keys = json
                    .as_object()
                    .map(|object| object.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                trace!("{origin}: unexpected response with keys {keys:?}");
            } else {
                error!("{origin}: failed parsing response ({e})");
            }
            Err(e.into())
        }
    }
}
