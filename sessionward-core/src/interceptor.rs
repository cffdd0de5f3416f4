//! Authorization around outbound requests.
//!
//! [`Interceptor::call`] wraps any request function that returns
//! `Result<T, RequestError>`:
//!
//! - before sending, the current access token (if any) is handed to the
//!   function to attach;
//! - if the function reports [`RequestError::Unauthorized`] and the request
//!   has not been replayed yet, the session is renewed (sharing any renewal in
//!   flight) and the request is replayed once with the new token;
//! - every other outcome passes through untouched.
//!
//! [`ApiClient`] applies this to `reqwest` requests against the remote
//! service.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::config::SessionConfig;
use crate::error::SessionwardError;
use crate::gateway::join_path;
use crate::model::{ApiEnvelope, UserProfile, bearer};
use crate::session::{SessionError, SessionManager};
use crate::store::Secret;

/// Maximum length for response bodies kept in errors.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error type for authorized requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The server rejected the request's credentials (HTTP 401).
    #[error("unauthorized - access token missing, invalid or expired")]
    Unauthorized,

    /// Any other non-success status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with `success: false`.
    #[error("request rejected: {message}")]
    Rejected {
        message: String,
        code: Option<String>,
    },

    /// The request could not be built or sent.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The response body could not be decoded.
    #[error("invalid response: {message}")]
    Decode { message: String },

    /// Renewing the session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl RequestError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return RequestError::Unauthorized;
        }
        RequestError::Status {
            status: status.as_u16(),
            body: truncate_body(body),
        }
    }

    /// Whether this is the authorization failure that triggers renewal.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, RequestError::Unauthorized)
    }

    /// Whether the session is over and the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            RequestError::Session(SessionError::NotLoggedIn | SessionError::RenewalFailed(_))
        )
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
    format!("{}... (truncated, {} total bytes)", cut, body.len())
}

/// Per-request flag recording that the request was already replayed after a
/// renewal. Set at most once, never cleared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryMarker {
    retried: bool,
}

impl RetryMarker {
    pub fn is_set(&self) -> bool {
        self.retried
    }

    pub fn set(&mut self) {
        self.retried = true;
    }
}

/// Attaches credentials to requests and retries authorization failures once.
#[derive(Debug, Clone)]
pub struct Interceptor {
    session: Arc<SessionManager>,
    renew_before_send: bool,
}

impl Interceptor {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            renew_before_send: false,
        }
    }

    /// Renew an expired access token before the first send.
    pub fn with_renew_before_send(mut self, enabled: bool) -> Self {
        self.renew_before_send = enabled;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Run `send`, renewing and replaying once on an authorization failure.
    ///
    /// `send` receives the access token to attach, or `None` when there is no
    /// session, and may be called twice. The replay's outcome is returned
    /// as-is, including a second authorization failure.
    pub async fn call<T, F, Fut>(&self, mut send: F) -> Result<T, RequestError>
    where
        F: FnMut(Option<Secret>) -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut marker = RetryMarker::default();
        let mut credential = self.credential_for_send().await?;

        loop {
            match send(credential.take()).await {
                Err(RequestError::Unauthorized) if !marker.is_set() => {
                    marker.set();
                    tracing::debug!("Authorization failed, renewing session before replay");
                    credential = Some(self.session.renew().await?);
                }
                Err(RequestError::Unauthorized) => {
                    tracing::warn!("Authorization failed again after renewal");
                    return Err(RequestError::Unauthorized);
                }
                outcome => return outcome,
            }
        }
    }

    async fn credential_for_send(&self) -> Result<Option<Secret>, RequestError> {
        if !self.renew_before_send {
            return Ok(self.session.access_token());
        }

        match self.session.ensure_access_token(Utc::now()).await {
            Ok(token) => Ok(Some(token)),
            Err(SessionError::NotLoggedIn) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// HTTP client for the remote service with authorization handled by an
/// [`Interceptor`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn example(session: std::sync::Arc<sessionward_core::SessionManager>)
/// #     -> Result<(), Box<dyn std::error::Error>> {
/// use sessionward_core::{ApiClient, SessionConfig};
///
/// let client = ApiClient::new(session, &SessionConfig::default())?;
/// let cart: serde_json::Value = client.get_json("cart").await?;
/// println!("{}", cart);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    interceptor: Interceptor,
}

impl ApiClient {
    /// Create a client for the service described by `config`.
    pub fn new(session: Arc<SessionManager>, config: &SessionConfig) -> Result<Self, SessionwardError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RequestError::Transport {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url()?,
            interceptor: Interceptor::new(session)
                .with_renew_before_send(config.renew_before_send),
        })
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Absolute URL for a path below the base URL.
    pub fn url(&self, path: &str) -> Result<Url, RequestError> {
        join_path(&self.base_url, path).map_err(|e| RequestError::Transport {
            message: format!("invalid path {}: {}", path, e),
        })
    }

    /// Start building a request for a path below the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, RequestError> {
        Ok(self.http.request(method, self.url(path)?))
    }

    /// Send `request` with the session's credentials.
    ///
    /// The request is cloned for each attempt, so streaming bodies are not
    /// supported.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, RequestError> {
        let http = &self.http;
        let template = &request;

        self.interceptor
            .call(|credential| {
                let attempt = template.try_clone();
                async move {
                    let mut attempt = attempt.ok_or_else(|| RequestError::Transport {
                        message: "request body cannot be replayed".to_string(),
                    })?;

                    if let Some(token) = credential {
                        let mut value = HeaderValue::from_str(&bearer(&token)).map_err(|_| {
                            RequestError::Transport {
                                message: "access token is not a valid header value".to_string(),
                            }
                        })?;
                        value.set_sensitive(true);
                        attempt.headers_mut().insert(AUTHORIZATION, value);
                    }

                    tracing::debug!("{} {}", attempt.method(), attempt.url());
                    let response = http.execute(attempt).await.map_err(transport_error)?;
                    check_status(response).await
                }
            })
            .await
    }

    /// GET a path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let request = self
            .request(Method::GET, path)?
            .build()
            .map_err(transport_error)?;
        decode_json(self.execute(request).await?).await
    }

    /// POST a JSON body to a path and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .request(Method::POST, path)?
            .json(body)
            .build()
            .map_err(transport_error)?;
        decode_json(self.execute(request).await?).await
    }

    /// GET a path answering with an [`ApiEnvelope`] and return its data.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let envelope: ApiEnvelope<T> = self.get_json(path).await?;
        if !envelope.success {
            return Err(RequestError::Rejected {
                message: envelope.message_or("request rejected"),
                code: envelope.error_code,
            });
        }
        envelope.data.ok_or_else(|| RequestError::Decode {
            message: format!("response from {} carried no data", path),
        })
    }

    /// The logged-in user's profile, as the server sees it.
    pub async fn current_user(&self) -> Result<UserProfile, RequestError> {
        self.get_data("auth/me").await
    }
}

fn transport_error(e: reqwest::Error) -> RequestError {
    RequestError::Transport {
        message: e.to_string(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RequestError::from_status(status, &body))
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RequestError> {
    response.json().await.map_err(|e| RequestError::Decode {
        message: e.to_string(),
    })
}
