//! REST client for the learning platform API.
//!
//! Uses the blocking reqwest client: remote writes already run on the sync
//! worker thread and the only reads happen while a course is being opened.

use super::payloads::{
    BookmarkPayload, CoursePayload, LoginRequest, LoginResponse, NotePayload, NotesPayload,
    ProgressPayload, VerifyResponse,
};
use super::{AuthService, CatalogService, ProgressRemote, RemoteProgress, User};
use crate::config::AppConfig;
use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Mutex<Option<String>>,
    user: Mutex<Option<User>>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid API base url {base_url}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("API base url {base_url} cannot carry a path"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            token: Mutex::new(token),
            user: Mutex::new(None),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            config.remote_timeout(),
            config.auth_token.clone(),
        )
    }

    /// Resolve the signed-in user from a stored token, if any.
    pub fn verify(&self) -> Result<Option<User>> {
        if self.token().is_none() {
            return Ok(None);
        }
        let verified: Option<VerifyResponse> = self.get_json(&["auth", "verify"])?;
        let user = verified.map(|response| response.user);
        self.set_user(user.clone());
        if let Some(user) = &user {
            info!(user_id = %user.id, "Verified stored session");
        }
        Ok(user)
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| anyhow!("API base url cannot carry a path"))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn token(&self) -> Option<String> {
        match self.token.lock() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_token(&self, value: Option<String>) {
        match self.token.lock() {
            Ok(mut token) => *token = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn set_user(&self, value: Option<User>) {
        match self.user.lock() {
            Ok(mut user) => *user = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self
            .request(Method::GET, url.clone())
            .send()
            .with_context(|| format!("GET {url} failed"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("GET {url} was rejected"))?;
        let body = response
            .json::<T>()
            .with_context(|| format!("GET {url} returned an unexpected body"))?;
        Ok(Some(body))
    }

    fn post_json<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> Result<()> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        self.request(Method::POST, url.clone())
            .json(body)
            .send()
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} was rejected"))?;
        Ok(())
    }
}

/// True when the error chain holds a connect or timeout failure, i.e. the
/// server never answered. Rejections with a status code are not transport
/// errors.
pub fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|err| err.status().is_none() && (err.is_connect() || err.is_timeout()))
    })
}

impl AuthService for HttpBackend {
    fn current_user(&self) -> Option<User> {
        match self.user.lock() {
            Ok(user) => user.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn login(&self, email: &str, password: &str) -> Result<User> {
        let url = self.endpoint(&["auth", "login"])?;
        let response: LoginResponse = self
            .client
            .post(url.clone())
            .json(&LoginRequest { email, password })
            .send()
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .context("login rejected")?
            .json()
            .context("login returned an unexpected body")?;
        self.set_token(Some(response.token));
        self.set_user(Some(response.user.clone()));
        info!(user_id = %response.user.id, "Signed in");
        Ok(response.user)
    }

    fn logout(&self) {
        if self.token().is_some() {
            if let Err(err) = self.post_json(&["auth", "logout"], &serde_json::json!({})) {
                warn!("Remote logout failed: {err:#}");
            }
        }
        self.set_token(None);
        self.set_user(None);
    }
}

impl CatalogService for HttpBackend {
    fn get_course(&self, course_id: &str) -> Result<Option<CoursePayload>> {
        self.get_json(&["courses", course_id])
    }
}

impl ProgressRemote for HttpBackend {
    fn get_progress(&self, course_id: &str) -> Result<RemoteProgress> {
        match self.get_json::<serde_json::Value>(&["progress", course_id])? {
            Some(value) => RemoteProgress::from_json(value).context("unexpected progress body"),
            None => Ok(RemoteProgress::default()),
        }
    }

    fn post_progress(&self, course_id: &str, payload: &ProgressPayload) -> Result<()> {
        self.post_json(&["progress", course_id], payload)
    }

    fn complete_topic(&self, course_id: &str, topic_id: &str) -> Result<()> {
        self.post_json(
            &["progress", course_id, "topics", topic_id, "complete"],
            &serde_json::json!({}),
        )
    }

    fn get_bookmark(&self, course_id: &str) -> Result<Option<BookmarkPayload>> {
        self.get_json(&["progress", course_id, "bookmark"])
    }

    fn post_bookmark(&self, course_id: &str, bookmark: &BookmarkPayload) -> Result<()> {
        self.post_json(&["progress", course_id, "bookmark"], bookmark)
    }

    fn get_notes(&self, course_id: &str) -> Result<NotesPayload> {
        Ok(self
            .get_json(&["progress", course_id, "notes"])?
            .unwrap_or_default())
    }

    fn post_note(&self, course_id: &str, note: &NotePayload) -> Result<()> {
        self.post_json(&["progress", course_id, "notes"], note)
    }
}
