//! OAuth2 credential lifecycle.
//!
//! [`Credential`] decides whether a login is needed, drives the
//! authorization-code flow, refreshes expired access tokens and hands every
//! token exchange result to a caller-supplied callback for persistence.
//!
//! # States
//!
//! At any instant exactly one of these holds:
//! * the access token is valid: nothing to do
//! * only the refresh token is valid: one refresh exchange
//! * neither is valid: full authorization-code flow through the browser
//!
//! # Authorization-code flow
//!
//! 1. Bind the callback listener, so that a busy port fails the login
//!    before the browser is involved
//! 2. Hand the login URL to the URL handler
//! 3. Wait for the redirect carrying the authorization code
//! 4. Exchange the code at the token endpoint
//! 5. Hand the tokens to the persistence callback, then adopt them
//!
//! No state changes unless both the exchange and the persistence callback
//! succeed.

use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    callback::CallbackListener,
    clock::Clock,
    config::Settings,
    error::{Error, Result},
    http::Transport,
    protocol::{
        self,
        auth::{AuthData, AuthError},
    },
    tokens::Token,
};

/// Receives the result of every successful token exchange.
pub type LoginDataCallback = Box<dyn FnMut(&AuthData) -> Result<()> + Send>;

/// Presents the login URL to the user.
pub type LoginUrlHandler = Box<dyn FnMut(&str) -> Result<()> + Send>;

/// Base URL of the Microsoft identity platform endpoints.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common/oauth2/v2.0";

/// Path of the authorization endpoint below the authority.
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Path of the token endpoint below the authority.
pub const TOKEN_PATH: &str = "/token";

/// Factor from `ext_expires_in` to the refresh token lifetime.
///
/// The token endpoint does not report how long refresh tokens live. They
/// are good for about 90 days of inactivity, so `ext_expires_in` (roughly
/// an hour) is stretched by 200 × 24.
pub const REFRESH_TOKEN_VALIDITY_MULTIPLIER: u32 = 200 * 24;

/// How long to wait for the browser redirect by default.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The kind of token exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

fn out_of_range(grant: Grant) -> Error {
    Error::invalid_argument(format!(
        "{} grant response: expiry out of range",
        grant.as_str()
    ))
}

pub struct Credential {
    client_id: String,
    client_secret: String,
    permissions: String,

    access_token: Token,
    refresh_token: Token,

    auth_callback_host: String,
    auth_callback_path: String,

    authority: String,
    listen_timeout: Duration,

    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,

    login_data_callback: LoginDataCallback,
    login_url_handler: LoginUrlHandler,
}

impl Credential {
    /// Creates a credential from persisted settings.
    ///
    /// Until [`Credential::on_login_data`] is called, exchange results are
    /// not persisted anywhere. Until [`Credential::on_login_url`] is called,
    /// the login URL is only logged.
    pub fn new<T, C>(settings: &Settings, transport: T, clock: C) -> Self
    where
        T: Transport + 'static,
        C: Clock + 'static,
    {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            permissions: settings.permissions.clone(),

            access_token: Token::new(
                settings.access_token.clone(),
                settings.access_token_expires_at,
            ),
            refresh_token: Token::new(
                settings.refresh_token.clone(),
                settings.refresh_token_expires_at,
            ),

            auth_callback_host: settings.auth_callback_host.clone(),
            auth_callback_path: settings.auth_callback_path.clone(),

            authority: DEFAULT_AUTHORITY.to_owned(),
            listen_timeout: DEFAULT_LISTEN_TIMEOUT,

            transport: Box::new(transport),
            clock: Arc::new(clock),

            login_data_callback: Box::new(|_| {
                debug!("no persistence configured; tokens are kept in memory only");
                Ok(())
            }),
            login_url_handler: Box::new(|url| {
                info!("log in at {url}");
                Ok(())
            }),
        }
    }

    /// Uses another authorization server, e.g. a tenant-specific one.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Bounds how long [`Credential::perform_login`] waits for the browser.
    #[must_use]
    pub fn with_listen_timeout(mut self, timeout: Duration) -> Self {
        self.listen_timeout = timeout;
        self
    }

    /// Sets the callback that persists exchange results.
    #[must_use]
    pub fn on_login_data<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&AuthData) -> Result<()> + Send + 'static,
    {
        self.login_data_callback = Box::new(callback);
        self
    }

    /// Sets the handler that presents the login URL to the user.
    #[must_use]
    pub fn on_login_url<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str) -> Result<()> + Send + 'static,
    {
        self.login_url_handler = Box::new(handler);
        self
    }

    /// Whether the access token is absent or expired.
    #[must_use]
    pub fn login_needed(&self) -> bool {
        !self.access_token.is_valid_at(self.clock.now())
    }

    /// The access token, if it is still valid.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .is_valid_at(self.clock.now())
            .then(|| self.access_token.value())
    }

    /// Makes sure a valid access token is available.
    ///
    /// * Valid access token: returns immediately.
    /// * Valid refresh token: exchanges it for new tokens.
    /// * Otherwise: runs the authorization-code flow, blocking until the
    ///   browser redirect arrives or the listen timeout passes.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails: the callback port cannot be
    /// bound, the URL handler fails, the redirect does not arrive in time,
    /// the token endpoint rejects the request or replies with garbage, or
    /// the persistence callback fails. Nothing is retried.
    pub async fn perform_login(&mut self) -> Result<()> {
        let now = self.clock.now();

        if self.access_token.is_valid_at(now) {
            debug!(
                "access token valid for another {}s",
                self.access_token.time_to_live(now).as_secs()
            );
            return Ok(());
        }

        if self.refresh_token.is_valid_at(now) {
            info!("access token expired; refreshing");
            return self.refresh().await;
        }

        info!("logging in");
        self.authorize().await
    }

    /// Full authorization-code flow.
    async fn authorize(&mut self) -> Result<()> {
        let redirect_uri = self.redirect_uri();
        let addr = CallbackListener::bind_address(&redirect_uri)?;
        let listener = CallbackListener::bind(&addr, self.auth_callback_path.clone()).await?;

        let login_url = self.login_url()?;
        (self.login_url_handler)(login_url.as_str())?;

        let timeout = self.listen_timeout;
        let this = &mut *self;
        listener
            .serve_once(timeout, move |code| async move {
                this.exchange_code(code).await
            })
            .await
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// See [`Credential::perform_login`].
    pub async fn exchange_code(&mut self, code: String) -> Result<()> {
        let redirect_uri = self.redirect_uri();
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", Grant::AuthorizationCode.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", self.permissions.as_str()),
        ];

        let data = self.request_tokens(Grant::AuthorizationCode, &form).await?;
        self.adopt(Grant::AuthorizationCode, &data)
    }

    /// Exchanges the refresh token for new tokens.
    async fn refresh(&mut self) -> Result<()> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", Grant::RefreshToken.as_str()),
            ("refresh_token", self.refresh_token.value()),
        ];

        let data = self.request_tokens(Grant::RefreshToken, &form).await?;
        self.adopt(Grant::RefreshToken, &data)
    }

    /// Posts `form` to the token endpoint and parses the reply.
    ///
    /// The returned refresh token lifetime is already scaled by
    /// [`REFRESH_TOKEN_VALIDITY_MULTIPLIER`].
    async fn request_tokens(&self, grant: Grant, form: &[(&str, &str)]) -> Result<AuthData> {
        let url = self.token_url()?;
        debug!("requesting tokens with {} grant", grant.as_str());

        let reply = self.transport.post_form(url, form).await?;
        if !reply.status.is_success() {
            let reason = match serde_json::from_slice::<AuthError>(&reply.body) {
                Ok(AuthError {
                    error,
                    error_description,
                }) if !error_description.is_empty() => format!("{error}: {error_description}"),
                Ok(AuthError { error, .. }) => error,
                Err(_) => String::from_utf8_lossy(&reply.body).into_owned(),
            };
            return Err(Error::from_status(
                reply.status,
                format!(
                    "{} grant rejected with {}: {reason}",
                    grant.as_str(),
                    reply.status
                ),
            ));
        }

        let mut data: AuthData = protocol::json(&reply.body, "token").map_err(|e| {
            Error::new(
                e.kind,
                format!("malformed {} grant response: {}", grant.as_str(), e.error),
            )
        })?;

        data.ext_expires_in = data
            .ext_expires_in
            .checked_mul(REFRESH_TOKEN_VALIDITY_MULTIPLIER)
            .ok_or_else(|| out_of_range(grant))?;
        Ok(data)
    }

    /// Persists `data` and, if that worked, starts using it.
    ///
    /// Lifetimes that do not fit a `SystemTime` are rejected before the
    /// persistence callback sees them.
    fn adopt(&mut self, grant: Grant, data: &AuthData) -> Result<()> {
        let now = self.clock.now();
        let access_expires_at = now
            .checked_add(data.expires_in)
            .ok_or_else(|| out_of_range(grant))?;
        let refresh_expires_at = now
            .checked_add(data.ext_expires_in)
            .ok_or_else(|| out_of_range(grant))?;

        (self.login_data_callback)(data)?;

        self.access_token = Token::new(data.access_token.clone(), access_expires_at);
        self.refresh_token = Token::new(data.refresh_token.clone(), refresh_expires_at);

        info!("logged in successfully");
        Ok(())
    }

    /// Where the authorization server sends the browser back to.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.auth_callback_host, self.auth_callback_path)
    }

    /// The URL the user has to visit to log in.
    ///
    /// Query parameters are sorted by key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the authority is not a valid URL.
    pub fn login_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{AUTHORIZE_PATH}", self.authority))?;
        let redirect_uri = self.redirect_uri();

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("response_type", "code")
            .append_pair("scope", &self.permissions);

        Ok(url)
    }

    fn token_url(&self) -> Result<Url> {
        Url::parse(&format!("{}{TOKEN_PATH}", self.authority)).map_err(Into::into)
    }
}
