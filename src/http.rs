//! HTTP client with rate limiting for the identity and Graph APIs.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting to stay well within Microsoft Graph throttling
//! * Consistent timeouts and headers
//! * The [`Transport`] seam used by the credential state machine
//!
//! # Example
//!
//! ```rust,ignore
//! use mstodo::http::{Client, Transport};
//!
//! let client = Client::new(&config)?;
//! let reply = client.post_form(token_url, &[("grant_type", "refresh_token")]).await?;
//! ```

use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Body, Method, Url,
};

use crate::{config::Config, error::Result};

/// Status and body of a completed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: http::StatusCode,
    pub body: Vec<u8>,
}

/// Outbound requests needed by the token exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `form` as an `application/x-www-form-urlencoded` POST body.
    ///
    /// Parameters are encoded in the order given.
    async fn post_form(&self, url: Url, form: &[(&str, &str)]) -> Result<TransportResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post_form(&self, url: Url, form: &[(&str, &str)]) -> Result<TransportResponse> {
        (**self).post_form(url, form).await
    }
}

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window for the rate limiter.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(10);

    /// Maximum allowed calls per interval.
    ///
    /// A single command makes a handful of calls, so this only kicks in
    /// when something loops.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 20;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    const READ_TIMEOUT: Duration = Duration::from_secs(30);

    /// Duration to wait for a connection to be established.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    const FORM_CONTENT: HeaderValue = HeaderValue::from_static("application/x-www-form-urlencoded");
    const JSON_CONTENT: HeaderValue = HeaderValue::from_static("application/json");

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built, for example when
    /// the TLS backend fails to initialize.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, Self::JSON_CONTENT);

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        let body_mut = request.body_mut();
        *body_mut = Some(body.into());

        request
    }

    /// Builds a GET request with an empty body.
    pub fn get<U>(&self, url: U) -> reqwest::Request
    where
        U: Into<Url>,
    {
        reqwest::Request::new(Method::GET, url.into())
    }

    /// Builds a POST request with a JSON body.
    pub fn post_json<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = self.request(Method::POST, url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, Self::JSON_CONTENT);
        request
    }

    /// Builds a PATCH request with a JSON body.
    pub fn patch_json<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = self.request(Method::PATCH, url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, Self::JSON_CONTENT);
        request
    }

    /// Adds a bearer `Authorization` header to `request`.
    ///
    /// # Errors
    ///
    /// Returns error if the token contains characters not allowed in a
    /// header value.
    pub fn authorize(request: &mut reqwest::Request, access_token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {access_token}"))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * Request execution fails
    /// * Network error occurs
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        trace!("{} {}", request.method(), request.url());
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}

#[async_trait]
impl Transport for Client {
    async fn post_form(&self, url: Url, form: &[(&str, &str)]) -> Result<TransportResponse> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        let mut request = self.request(Method::POST, url, body);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, Self::FORM_CONTENT);

        let response = self.execute(request).await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!("token endpoint replied with {status}");

        Ok(TransportResponse { status, body })
    }
}
