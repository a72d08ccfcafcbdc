use std::time::{Duration, SystemTime};

use veil::Redact;

/// An OAuth token together with the instant it stops being usable.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Redact)]
pub struct Token {
    #[redact]
    value: String,
    expires_at: SystemTime,
}

impl Token {
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the token can still be used at `now`.
    ///
    /// A token expiring exactly at `now` is already invalid.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        !self.value.is_empty() && now < self.expires_at
    }

    #[must_use]
    pub fn time_to_live(&self, now: SystemTime) -> Duration {
        self.expires_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}
