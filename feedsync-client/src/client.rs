use crate::record::decode_list;
use async_trait::async_trait;
use feedsync_common::{
    model::{
        Id,
        comment::{Comment, CreateComment},
        post::{Post, PostMarker},
        user::User,
    },
    util::PositiveDuration,
};
use rand::seq::IndexedRandom;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::{
    fmt::{Debug, Formatter},
    time::Duration,
};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const APP_ID_HEADER: &str = "app-id";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The request could not be completed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("The API replied with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("The API response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("The API returned no users to act as")]
    EmptyUserSet,
    #[error("The base URL cannot have endpoint paths appended: {0}")]
    InvalidBaseUrl(Url),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(err) => err.status(),
            ApiError::Decode(_) | ApiError::EmptyUserSet | ApiError::InvalidBaseUrl(_) => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Network(err) if err.is_timeout())
    }
}

/// The remote content API as seen by the sync components.
///
/// Every operation is a single request/response pair. Nothing is retried.
/// An empty result is a valid answer, not an error.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<Post>>;

    /// Persists the full representation of `post`.
    async fn update_post(&self, post: &Post) -> Result<()>;

    async fn list_comments(&self, post_id: &Id<PostMarker>) -> Result<Vec<Comment>>;

    async fn create_comment(&self, comment: &CreateComment) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Fetches the full user list and picks one uniformly at random.
    async fn pick_random_user(&self) -> Result<User> {
        let users = self.list_users().await?;
        users
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(ApiError::EmptyUserSet)
    }
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ClientConfig {
    pub base_url: Url,
    pub app_id: String,
    pub timeout: PositiveDuration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url, app_id: String) -> Self {
        Self {
            base_url,
            app_id,
            timeout: PositiveDuration::new_unchecked(DEFAULT_TIMEOUT),
        }
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("app_id", &"[redacted]")
            .field("timeout", &self.timeout.get())
            .finish()
    }
}

#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    app_id: String,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.base_url));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout.get())
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url,
            app_id: config.app_id,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let response = request
            .header(APP_ID_HEADER, &self.app_id)
            .send()
            .await
            .map_err(ApiError::Network)?;

        let status = response.status();
        let body = response.text().await.map_err(ApiError::Network)?;

        if !status.is_success() {
            debug!(%status, "API rejected request");
            return Err(ApiError::Status { status, body });
        }

        Ok(body)
    }

    async fn fetch_list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        debug!(%url, "GET");
        let body = self.send(self.http.get(url)).await?;

        Ok(decode_list(&body)?)
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let url = self.endpoint(&["post"])?;
        self.fetch_list(url).await
    }

    async fn update_post(&self, post: &Post) -> Result<()> {
        let url = self.endpoint(&["post", post.id.as_str()])?;
        debug!(%url, likes = post.likes, "PUT");
        self.send(self.http.put(url).json(post)).await?;

        Ok(())
    }

    async fn list_comments(&self, post_id: &Id<PostMarker>) -> Result<Vec<Comment>> {
        let url = self.endpoint(&["post", post_id.as_str(), "comment"])?;
        self.fetch_list(url).await
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<()> {
        let url = self.endpoint(&["comment", "create"])?;
        debug!(%url, post_id = %comment.post, "POST");
        self.send(self.http.post(url).json(comment)).await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let url = self.endpoint(&["user"])?;
        self.fetch_list(url).await
    }
}
