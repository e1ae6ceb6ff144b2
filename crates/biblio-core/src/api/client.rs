//! API client for the library catalog REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests against the catalog. Every call is sent exactly once: there is no
//! retry, backoff or caching at this layer.

use std::time::Duration;

use anyhow::Context;
use reqwest::{header, Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

use crate::auth::{Credentials, Registration, SessionStore, Token};
use crate::models::{BookDraft, BookRecord};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when none is configured (host loopback from the Android emulator)
pub const DEFAULT_BASE_URL: &str = "http://10.0.2.2:8080/api";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// TCP connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const BOOKS_PATH: &str = "/livres";

/// How credentials are presented to the login endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginScheme {
    /// JSON body `{username, password}`
    #[default]
    Body,
    /// `Authorization: Basic` header, no body
    Basic,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub login_scheme: LoginScheme,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            login_scheme: LoginScheme::default(),
        }
    }
}

/// Payload returned by the login endpoint. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Which credential, if any, goes on a request.
#[derive(Clone, Copy)]
enum Auth<'a> {
    /// Never attach the session token
    Anonymous,
    /// Attach the session token when there is one
    Optional,
    /// Fail with `Unauthorized` before sending if there is no session
    Required,
    /// Basic credentials for the login call
    Basic(&'a Credentials),
}

/// API client for the library catalog.
/// Clone is cheap - reqwest::Client and SessionStore both share state via Arc.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    login_scheme: LoginScheme,
    session: SessionStore,
}

impl ApiClient {
    /// Create a new API client reading its token from `session`
    pub fn new(config: ApiConfig, session: SessionStore) -> anyhow::Result<Self> {
        reqwest::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.base_url))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login_scheme: config.login_scheme,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn book_url(id: i64) -> String {
        format!("{}/{}", BOOKS_PATH, id)
    }

    /// Check if response is successful, returning an error with body if not.
    /// A 401 for a request that carried `token` ends that session.
    async fn check_response(&self, response: Response, token: Option<&Token>) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);

        if error.is_unauthorized() {
            if let Some(token) = token {
                if self.session.invalidate(token) {
                    warn!("Server rejected the session token, logged out");
                }
            }
        }

        debug!(status = %status, "Request failed");
        Err(error)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        auth: Auth<'_>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path);

        let token = match auth {
            Auth::Optional => self.session.current_token(),
            Auth::Required => Some(self.session.current_token().ok_or(ApiError::Unauthorized)?),
            Auth::Anonymous | Auth::Basic(_) => None,
        };

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");

        if let Some(ref token) = token {
            request = request.bearer_auth(token.as_str());
        }
        if let Auth::Basic(credentials) = auth {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, url = %url, authenticated = token.is_some(), "Sending request");
        let response = request.send().await?;

        self.check_response(response, token.as_ref()).await
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(path = path, error = %e, "Unexpected response payload");
            ApiError::Validation(format!("Unexpected response payload from {}: {}", path, e))
        })
    }

    /// Issue a call against `path`, attaching the session token if there is
    /// one, and decode the 2xx body as `T`.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, path, body, Auth::Optional).await?;
        Self::decode(response, path).await
    }

    // ===== Authentication =====

    /// Exchange credentials for a token. Does not touch the session; see
    /// [`SessionStore::login`].
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        credentials.validate()?;

        let result = match self.login_scheme {
            LoginScheme::Body => {
                self.send(Method::POST, LOGIN_PATH, Some(credentials), Auth::Anonymous)
                    .await
            }
            LoginScheme::Basic => {
                self.send(Method::POST, LOGIN_PATH, None::<&()>, Auth::Basic(credentials))
                    .await
            }
        };

        let response = result.map_err(|e| match e {
            ApiError::Unauthorized => {
                ApiError::AuthenticationFailed("Invalid username or password".to_string())
            }
            ApiError::AccessDenied(msg) => ApiError::AuthenticationFailed(msg),
            other => other,
        })?;

        Self::decode(response, LOGIN_PATH).await
    }

    /// Create an account. The caller logs in separately afterwards.
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        registration.validate()?;
        self.send(Method::POST, REGISTER_PATH, Some(registration), Auth::Anonymous)
            .await?;
        Ok(())
    }

    // ===== Books =====

    pub async fn list_books(&self) -> Result<Vec<BookRecord>, ApiError> {
        self.request(Method::GET, BOOKS_PATH, None::<&()>).await
    }

    /// Books currently out on loan
    pub async fn list_borrowed_books(&self) -> Result<Vec<BookRecord>, ApiError> {
        let books = self.list_books().await?;
        Ok(books.into_iter().filter(BookRecord::is_borrowed).collect())
    }

    pub async fn create_book(&self, draft: &BookDraft) -> Result<BookRecord, ApiError> {
        draft.validate()?;
        let response = self
            .send(Method::POST, BOOKS_PATH, Some(draft), Auth::Required)
            .await?;
        Self::decode(response, BOOKS_PATH).await
    }

    pub async fn update_book(&self, id: i64, draft: &BookDraft) -> Result<BookRecord, ApiError> {
        draft.validate()?;
        let path = Self::book_url(id);
        let response = self
            .send(Method::PUT, &path, Some(draft), Auth::Required)
            .await
            .map_err(|e| book_error(id, e))?;
        Self::decode(response, &path).await
    }

    pub async fn delete_book(&self, id: i64) -> Result<(), ApiError> {
        self.send(Method::DELETE, &Self::book_url(id), None::<&()>, Auth::Required)
            .await
            .map_err(|e| book_error(id, e))?;
        Ok(())
    }

    /// Borrow a book. The server is the authority on availability: a book
    /// that is already out comes back as `BookUnavailable`.
    pub async fn borrow(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("{}/emprunt/{}", BOOKS_PATH, id);
        match self.send(Method::POST, &path, None::<&()>, Auth::Optional).await {
            Ok(_) => Ok(()),
            Err(ApiError::Conflict(_) | ApiError::BadRequest(_)) => {
                Err(ApiError::BookUnavailable { id })
            }
            Err(e) => Err(book_error(id, e)),
        }
    }

    /// Return a borrowed book. Returning a book that is not out comes back
    /// as `BookNotBorrowed`.
    pub async fn return_book(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("{}/retour/{}", BOOKS_PATH, id);
        match self.send(Method::POST, &path, None::<&()>, Auth::Optional).await {
            Ok(_) => Ok(()),
            Err(ApiError::Conflict(_) | ApiError::BadRequest(_)) => {
                Err(ApiError::BookNotBorrowed { id })
            }
            Err(e) => Err(book_error(id, e)),
        }
    }
}

/// A 404 from an endpoint addressed by book id means that book is gone.
fn book_error(id: i64, err: ApiError) -> ApiError {
    match err {
        ApiError::NotFound(_) => ApiError::BookNotFound { id },
        other => other,
    }
}
