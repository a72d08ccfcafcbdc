//! One-shot local HTTP endpoint for the OAuth redirect.
//!
//! After the user logs in, the authorization server redirects the browser
//! to `redirect_uri?code=...`. [`CallbackListener`] serves that request with
//! a single `axum` route, hands the code to a handler and tells the browser
//! how it went.
//!
//! Requests that do not carry a code (favicon lookups, denied consent,
//! stray reloads) are answered but otherwise ignored, and the listener
//! keeps waiting until a code arrives or the timeout passes.

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::{
    extract::{RawQuery, State},
    routing::get,
    Router,
};
use http::StatusCode;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use url::{form_urlencoded, Url};

use crate::error::{Error, Result};

/// Port used when the redirect URI does not name one.
pub const DEFAULT_PORT: u16 = 8080;

/// How long in-flight browser requests may take to finish once a code has
/// been handled.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shown in the browser after the handler succeeded.
pub const SUCCESS_MESSAGE: &str =
    "Successfully retrieved an authorization code.\nGo back to your console and check if login succeeded.";

/// Shown for codes that arrive after the login was decided.
const LOGIN_OVER: &str = "No login is in progress anymore.";

/// A code and where to report the outcome of handling it.
type Delivery = (String, oneshot::Sender<std::result::Result<(), String>>);

/// State shared by the route handler.
#[derive(Clone)]
struct Deliveries(mpsc::Sender<Delivery>);

/// A bound, not yet serving, callback endpoint.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Binds to `addr` and serves `path`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `path` cannot be routed, or another
    /// error if the address cannot be bound, for example because the port
    /// is already in use.
    pub async fn bind(addr: &str, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            let message = format!("could not listen on {addr} for the login callback: {e}");
            Error::new(Error::from(e).kind, message)
        })?;

        debug!("listening on {addr} for {path}");
        Ok(Self { listener, path })
    }

    /// The socket address to bind for `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `redirect_uri` is not an absolute URL
    /// with a host.
    pub fn bind_address(redirect_uri: &str) -> Result<String> {
        let url = Url::parse(redirect_uri).map_err(|e| {
            Error::invalid_argument(format!("invalid redirect URI \"{redirect_uri}\": {e}"))
        })?;
        let host = url.host_str().ok_or_else(|| {
            Error::invalid_argument(format!("redirect URI \"{redirect_uri}\" has no host"))
        })?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        Ok(format!("{host}:{port}"))
    }

    /// The address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has gone away.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Waits for a code, runs `handler` with it and shuts down.
    ///
    /// The handler is invoked at most once. Its error, if any, is written to
    /// the browser and returned.
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` if no code arrives within `timeout`, or
    /// whatever `handler` returns.
    pub async fn serve_once<F, Fut>(self, timeout: Duration, handler: F) -> Result<()>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (codes_tx, mut codes_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let app = Router::new()
            .route(&self.path, get(receive_code))
            .fallback(|| async { (StatusCode::NOT_FOUND, "not found") })
            .with_state(Deliveries(codes_tx));

        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });
        let abort = server.abort_handle();

        let result = match tokio::time::timeout(timeout, codes_rx.recv()).await {
            Ok(Some((code, outcome))) => {
                debug!("received authorization code");
                let result = handler(code).await;

                // The browser going away does not change the outcome of the login.
                let reply = match &result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(e.to_string()),
                };
                if outcome.send(reply).is_err() {
                    warn!("could not answer the browser");
                }

                result
            }
            Ok(None) => Err(Error::internal("callback server stopped unexpectedly")),
            Err(_) => Err(Error::deadline_exceeded(format!(
                "no authorization code received within {}",
                humantime::format_duration(timeout)
            ))),
        };

        // Unblocks requests still queued behind the first code.
        drop(codes_rx);
        let _ = stop_tx.send(());

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
            Ok(Ok(Ok(()))) => trace!("callback server stopped"),
            Ok(Ok(Err(e))) => warn!("callback server failed: {e}"),
            Ok(Err(e)) => warn!("callback server crashed: {e}"),
            Err(_) => {
                debug!("closing lingering callback connections");
                abort.abort();
            }
        }

        result
    }
}

/// Route handler: forwards the code and waits for the outcome.
async fn receive_code(
    State(Deliveries(codes)): State<Deliveries>,
    RawQuery(query): RawQuery,
) -> (StatusCode, String) {
    let code = match authorization_code(query.as_deref()) {
        Ok(code) => code,
        Err(reason) => {
            debug!("rejecting callback request: {reason}");
            return (StatusCode::BAD_REQUEST, reason);
        }
    };

    let (outcome_tx, outcome_rx) = oneshot::channel();
    if codes.send((code, outcome_tx)).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, LOGIN_OVER.to_owned());
    }

    match outcome_rx.await {
        Ok(Ok(())) => (StatusCode::OK, SUCCESS_MESSAGE.to_owned()),
        Ok(Err(message)) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, LOGIN_OVER.to_owned()),
    }
}

/// Extracts the authorization code from a redirect query.
///
/// Repeated `code` parameters are joined without a separator. Without a
/// code, the error holds what to tell the browser.
fn authorization_code(query: Option<&str>) -> std::result::Result<String, String> {
    let pairs = || form_urlencoded::parse(query.unwrap_or_default().as_bytes());

    let code: String = pairs()
        .filter(|(key, _)| key == "code")
        .map(|(_, value)| value)
        .collect();

    if !code.is_empty() {
        return Ok(code);
    }

    let param = |name: &str| {
        pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };
    match param("error_description").or_else(|| param("error")) {
        Some(description) => {
            warn!("authorization server reported: {description}");
            Err(description)
        }
        None => Err("no authorization code received".to_owned()),
    }
}

/// Checks that `path` is a literal route.
fn validate_path(path: &str) -> Result<()> {
    let literal = path.starts_with('/')
        && !path.contains(['{', '}'])
        && !path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'));

    if literal {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "callback path \"{path}\" must start with / and not contain {{, }}, :segment or *segment"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::ErrorKind;

    const PATH: &str = "/login/authorized";

    async fn listener() -> (CallbackListener, String) {
        let listener = CallbackListener::bind("127.0.0.1:0", PATH).await.unwrap();
        let base = format!("http://{}{PATH}", listener.local_addr().unwrap());
        (listener, base)
    }

    #[test]
    fn bind_address_follows_redirect_uri() {
        assert_eq!(
            CallbackListener::bind_address("http://localhost:8080/login/authorized").unwrap(),
            "localhost:8080"
        );
        assert_eq!(
            CallbackListener::bind_address("http://127.0.0.1/cb").unwrap(),
            "127.0.0.1:8080"
        );
        assert!(CallbackListener::bind_address("/login/authorized").is_err());
    }

    #[test]
    fn extracts_code_from_query() {
        assert_eq!(
            authorization_code(Some("code=XYZ&session_state=abc")),
            Ok("XYZ".to_owned())
        );
        assert_eq!(
            authorization_code(Some("code=ab&state=1&code=cd")),
            Ok("abcd".to_owned())
        );
        assert_eq!(
            authorization_code(Some("code=")),
            Err("no authorization code received".to_owned())
        );
        assert_eq!(
            authorization_code(None),
            Err("no authorization code received".to_owned())
        );
        assert_eq!(
            authorization_code(Some("error=access_denied&error_description=user+said+no")),
            Err("user said no".to_owned())
        );
        assert_eq!(
            authorization_code(Some("error=access_denied")),
            Err("access_denied".to_owned())
        );
    }

    #[tokio::test]
    async fn rejects_unroutable_paths() {
        for path in ["", "login", "/users/{id}", "/users/:id", "/*rest"] {
            let err = CallbackListener::bind("127.0.0.1:0", path).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "{path}");
        }
    }

    #[tokio::test]
    async fn invokes_handler_with_code() {
        let (listener, base) = listener().await;
        let received = Arc::new(Mutex::new(Vec::new()));

        let browser = tokio::spawn(async move {
            reqwest::get(format!("{base}?code=XYZ&session_state=abc"))
                .await
                .unwrap()
        });

        let sink = Arc::clone(&received);
        listener
            .serve_once(Duration::from_secs(5), |code| async move {
                sink.lock().unwrap().push(code);
                Ok(())
            })
            .await
            .unwrap();

        let response = browser.await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), SUCCESS_MESSAGE);
        assert_eq!(*received.lock().unwrap(), vec!["XYZ".to_owned()]);
    }

    #[tokio::test]
    async fn ignores_requests_without_code() {
        let (listener, base) = listener().await;
        let received = Arc::new(Mutex::new(Vec::new()));

        let browser = tokio::spawn(async move {
            let client = reqwest::Client::new();
            let missing = reqwest::get(format!("{base}?state=1")).await.unwrap();
            let empty = reqwest::get(format!("{base}?code=&state=1")).await.unwrap();
            let denied = reqwest::get(format!(
                "{base}?error=access_denied&error_description=user+said+no"
            ))
            .await
            .unwrap();
            let other = reqwest::get(base.replace(PATH, "/favicon.ico"))
                .await
                .unwrap();
            let posted = client
                .post(format!("{base}?code=posted"))
                .send()
                .await
                .unwrap();
            let good = reqwest::get(format!("{base}?code=second")).await.unwrap();
            (
                missing.status(),
                empty.status(),
                denied.status(),
                denied.text().await.unwrap(),
                other.status(),
                posted.status(),
                good.status(),
            )
        });

        let sink = Arc::clone(&received);
        listener
            .serve_once(Duration::from_secs(5), |code| async move {
                sink.lock().unwrap().push(code);
                Ok(())
            })
            .await
            .unwrap();

        let (missing, empty, denied, denied_text, other, posted, good) = browser.await.unwrap();
        assert_eq!(missing, reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(empty, reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(denied, reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(denied_text, "user said no");
        assert_eq!(other, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(posted, reqwest::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(good, reqwest::StatusCode::OK);
        assert_eq!(*received.lock().unwrap(), vec!["second".to_owned()]);
    }

    #[tokio::test]
    async fn broken_connections_do_not_end_the_wait() {
        use tokio::{io::AsyncWriteExt, net::TcpStream};

        let (listener, base) = listener().await;
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));

        let browser = tokio::spawn(async move {
            drop(TcpStream::connect(addr).await.unwrap());

            let mut garbage = TcpStream::connect(addr).await.unwrap();
            garbage.write_all(b"\x16\x03\x01 not http\r\n\r\n").await.unwrap();
            drop(garbage);

            reqwest::get(format!("{base}?code=XYZ")).await.unwrap().status()
        });

        let sink = Arc::clone(&received);
        listener
            .serve_once(Duration::from_secs(5), |code| async move {
                sink.lock().unwrap().push(code);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(browser.await.unwrap(), reqwest::StatusCode::OK);
        assert_eq!(*received.lock().unwrap(), vec!["XYZ".to_owned()]);
    }

    #[tokio::test]
    async fn joins_repeated_codes() {
        let (listener, base) = listener().await;
        let received = Arc::new(Mutex::new(Vec::new()));

        let browser =
            tokio::spawn(async move { reqwest::get(format!("{base}?code=ab&code=cd")).await });

        let sink = Arc::clone(&received);
        listener
            .serve_once(Duration::from_secs(5), |code| async move {
                sink.lock().unwrap().push(code);
                Ok(())
            })
            .await
            .unwrap();

        browser.await.unwrap().unwrap();
        assert_eq!(*received.lock().unwrap(), vec!["abcd".to_owned()]);
    }

    #[tokio::test]
    async fn handler_error_reaches_browser_and_caller() {
        let (listener, base) = listener().await;

        let browser = tokio::spawn(async move { reqwest::get(format!("{base}?code=XYZ")).await });

        let err = listener
            .serve_once(Duration::from_secs(5), |_| async {
                Err(Error::permission_denied("config file is read-only"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);

        let response = browser.await.unwrap().unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response
            .text()
            .await
            .unwrap()
            .contains("config file is read-only"));
    }

    #[tokio::test]
    async fn times_out_without_code() {
        let (listener, _) = listener().await;

        let err = listener
            .serve_once(Duration::from_millis(50), |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn closes_socket_after_first_code() {
        let (listener, base) = listener().await;
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move { reqwest::get(format!("{base}?code=XYZ")).await });
        listener
            .serve_once(Duration::from_secs(5), |_| async { Ok(()) })
            .await
            .unwrap();
        browser.await.unwrap().unwrap();

        let rebound = CallbackListener::bind(&addr.to_string(), PATH).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn port_in_use_fails_to_bind() {
        let (listener, _) = listener().await;
        let addr = listener.local_addr().unwrap().to_string();

        let err = CallbackListener::bind(&addr, PATH).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }
}
