//! Configuration file handling.
//!
//! The configuration lives in a TOML file, by default `~/.mstodo.toml`:
//!
//! ```toml
//! client_id = "00000000-0000-0000-0000-000000000000"
//! client_secret = "secret"
//! permissions = "offline_access Tasks.ReadWrite"
//! auth_callback_host_and_port = "http://localhost:8080"
//! auth_callback_path = "/login/authorized"
//! ```
//!
//! After a login, the tokens and their expiry timestamps (`ate`, `rte`) are
//! written back into the same file.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, TimestampSeconds};
use veil::Redact;

use crate::{
    error::{Error, Result},
    protocol::auth::AuthData,
};

/// Name of the configuration file in the home directory.
pub const DEFAULT_FILE_NAME: &str = ".mstodo.toml";

/// Maximum size of the configuration file.
///
/// Prevents an out-of-memory condition when pointed at the wrong file.
const MAX_FILE_SIZE: u64 = 64 * 1024;

/// Values persisted in the configuration file.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize, Redact)]
pub struct Settings {
    #[serde(default)]
    pub client_id: String,

    #[redact]
    #[serde(default)]
    pub client_secret: String,

    /// Space separated scopes to request.
    #[serde(default)]
    pub permissions: String,

    /// Scheme, host and port of the redirect URI, without trailing slash.
    #[serde(rename = "auth_callback_host_and_port", default)]
    pub auth_callback_host: String,

    /// Path of the redirect URI, with leading slash.
    #[serde(default)]
    pub auth_callback_path: String,

    #[redact]
    #[serde(default)]
    pub access_token: String,

    #[serde_as(as = "TimestampSeconds<i64, Flexible>")]
    #[serde(rename = "ate", default = "epoch")]
    pub access_token_expires_at: SystemTime,

    #[redact]
    #[serde(default)]
    pub refresh_token: String,

    #[serde_as(as = "TimestampSeconds<i64, Flexible>")]
    #[serde(rename = "rte", default = "epoch")]
    pub refresh_token_expires_at: SystemTime,
}

fn epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            permissions: String::new(),
            auth_callback_host: String::new(),
            auth_callback_path: String::new(),
            access_token: String::new(),
            access_token_expires_at: epoch(),
            refresh_token: String::new(),
            refresh_token_expires_at: epoch(),
        }
    }
}

impl Settings {
    /// Checks that every value needed to log in is present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` listing every missing key.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("permissions", &self.permissions),
            ("auth_callback_host_and_port", &self.auth_callback_host),
            ("auth_callback_path", &self.auth_callback_path),
        ];

        let missing: Vec<_> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| format!("missing {key}"))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "errors in config file:\n{}",
                missing.join("\n")
            )))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    pub user_agent: String,

    /// Where `settings` were read from and are written back to.
    pub path: PathBuf,

    pub settings: Settings,
}

impl Config {
    /// The default configuration file location.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_FILE_NAME))
            .ok_or_else(|| Error::not_found("could not determine home directory"))
    }

    /// Reads and validates the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is too large, is not
    /// valid TOML, or lacks required values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let file_size = fs::metadata(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::not_found(format!(
                        "{} does not exist; create it with your application's client_id, \
                         client_secret, permissions, auth_callback_host_and_port and \
                         auth_callback_path",
                        path.display()
                    ))
                } else {
                    e.into()
                }
            })?
            .len();
        if file_size > MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                path.display()
            )));
        }

        let contents = fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            Error::invalid_argument(format!("{} format is invalid: {e}", path.display()))
        })?;
        settings.validate()?;
        debug!("loaded configuration from {}", path.display());

        Ok(Self::with_settings(path, settings))
    }

    /// Builds a configuration around already loaded settings.
    #[must_use]
    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        // `User-Agent` tokens must not contain these.
        let sanitize = |s: &str| s.replace(['/', ';', '(', ')'], "_");
        let user_agent = format!(
            "{app_name}/{app_version} (Rust; {}/{})",
            sanitize(os_name),
            sanitize(&os_version)
        );
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,
            user_agent,
            path,
            settings,
        }
    }

    /// Writes the settings back to [`Config::path`].
    ///
    /// The file is replaced atomically so that an interrupted write never
    /// leaves a truncated configuration behind.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem operation fails.
    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(&self.settings)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        debug!("saved configuration to {}", self.path.display());

        Ok(())
    }

    /// Persists the result of a token exchange.
    ///
    /// Expiry timestamps are computed from `now`, the moment of
    /// persistence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a lifetime does not fit a timestamp, or
    /// an error if the file cannot be written. The in-memory settings are
    /// left untouched in both cases.
    pub fn store_login(&mut self, data: &AuthData, now: SystemTime) -> Result<()> {
        let expires_at = |lifetime| {
            now.checked_add(lifetime)
                .ok_or_else(|| Error::invalid_argument("token lifetime out of range"))
        };

        let mut settings = self.settings.clone();
        settings.access_token.clone_from(&data.access_token);
        settings.access_token_expires_at = expires_at(data.expires_in)?;
        settings.refresh_token.clone_from(&data.refresh_token);
        settings.refresh_token_expires_at = expires_at(data.ext_expires_in)?;

        let previous = std::mem::replace(&mut self.settings, settings);
        if let Err(e) = self.save() {
            self.settings = previous;
            return Err(e);
        }

        info!("stored new tokens in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    const COMPLETE: &str = r#"
client_id = "abc"
client_secret = "s3cret"
permissions = "offline_access Tasks.ReadWrite"
auth_callback_host_and_port = "http://localhost:8080"
auth_callback_path = "/login/authorized"
"#;

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_complete_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, COMPLETE);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.settings.client_id, "abc");
        assert_eq!(config.settings.auth_callback_host, "http://localhost:8080");
        assert!(config.settings.access_token.is_empty());
        assert_eq!(config.settings.access_token_expires_at, SystemTime::UNIX_EPOCH);
        assert!(config.user_agent.starts_with("mstodo/"));
    }

    #[test]
    fn reports_every_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "client_id = \"abc\"\n");

        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        let message = err.to_string();
        assert!(message.contains("missing client_secret"));
        assert!(message.contains("missing permissions"));
        assert!(message.contains("missing auth_callback_host_and_port"));
        assert!(message.contains("missing auth_callback_path"));
        assert!(!message.contains("missing client_id"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn store_login_persists_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, COMPLETE);
        let mut config = Config::load(Some(&path)).unwrap();

        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let data = AuthData {
            token_type: "Bearer".into(),
            scope: "Tasks.ReadWrite".into(),
            expires_in: Duration::from_secs(5),
            ext_expires_in: Duration::from_secs(10),
            access_token: "A".into(),
            refresh_token: "B".into(),
        };
        config.store_login(&data, now).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.settings.access_token, "A");
        assert_eq!(reloaded.settings.refresh_token, "B");
        assert_eq!(
            reloaded.settings.access_token_expires_at,
            now + Duration::from_secs(5)
        );
        assert_eq!(
            reloaded.settings.refresh_token_expires_at,
            now + Duration::from_secs(10)
        );
        assert_eq!(reloaded.settings.client_secret, "s3cret");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("ate = 1700000005"));
        assert!(raw.contains("rte = 1700000010"));
    }

    #[test]
    fn failed_store_keeps_previous_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_settings(
            dir.path().join("missing-dir").join("config.toml"),
            Settings::default(),
        );

        let data = AuthData {
            token_type: String::new(),
            scope: String::new(),
            expires_in: Duration::from_secs(5),
            ext_expires_in: Duration::from_secs(10),
            access_token: "A".into(),
            refresh_token: "B".into(),
        };
        assert!(config.store_login(&data, SystemTime::now()).is_err());
        assert!(config.settings.access_token.is_empty());
    }

    #[test]
    fn out_of_range_lifetime_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, COMPLETE);
        let mut config = Config::load(Some(&path)).unwrap();

        let data = AuthData {
            token_type: String::new(),
            scope: String::new(),
            expires_in: Duration::from_secs(5),
            ext_expires_in: Duration::from_secs(u64::MAX),
            access_token: "A".into(),
            refresh_token: "B".into(),
        };
        let err = config.store_login(&data, SystemTime::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(config.settings.access_token.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), COMPLETE);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let settings = Settings {
            client_secret: "hidden-secret".into(),
            access_token: "hidden-token".into(),
            ..Settings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hidden-secret"));
        assert!(!debug.contains("hidden-token"));
    }
}
