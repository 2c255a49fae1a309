//! # Portal Client
//!
//! HTTP client for the job portal's conversation and notification API.

use async_trait::async_trait;
use jobsync_realtime::{
    ConversationSummary, HistoryService, Notification, NotificationService, RealtimeError,
    TokenProvider,
};
use jobsync_types::Role;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::error::{ApiError, ApiResult};

/// HTTP client for the portal REST API.
///
/// Every request carries the bearer token the [`TokenProvider`] holds for
/// the role it is made on behalf of. The client is cheaply cloneable.
///
/// # Examples
///
/// ```rust,ignore
/// use jobsync_client::{api::PortalClient, StaticTokenProvider};
/// use jobsync_types::Role;
///
/// let tokens = StaticTokenProvider::new().with(Role::Employer, "eyJhbGciOi...");
/// let client = PortalClient::new("https://portal.example.com", Arc::new(tokens))?;
///
/// let conversations = client.list_conversations(Role::Employer).await?;
/// println!("{} conversations", conversations.len());
/// ```
#[derive(Clone)]
pub struct PortalClient {
    base_url: String,
    http: Client,
    tokens: Arc<dyn TokenProvider>,
}

/// List endpoints answer either with a bare array or a page object.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Plain(Vec<T>),
    Page { content: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Plain(items) | Listing::Page { content: items } => items,
        }
    }
}

impl PortalClient {
    /// Creates a client for the portal at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> ApiResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            http: Client::builder().timeout(Duration::from_secs(30)).build()?,
            tokens,
        })
    }

    /// Lists the conversations visible to `role`.
    ///
    /// # Errors
    ///
    /// * [`ApiError::Unauthenticated`] - No token for `role`
    /// * [`ApiError::ServerError`] - Non-success status
    /// * [`ApiError::InvalidResponse`] - Response could not be parsed
    pub async fn list_conversations(&self, role: Role) -> ApiResult<Vec<ConversationSummary>> {
        let request = self
            .http
            .get(format!("{}/api/chat/conversations", self.base_url))
            .query(&[("role", role.as_str())]);
        let res = self.send(role, request).await?;
        Self::listing(res).await
    }

    /// Marks a conversation as seen on the `role` side.
    ///
    /// # Errors
    ///
    /// * [`ApiError::Unauthenticated`] - No token for `role`
    /// * [`ApiError::ServerError`] - Conversation not found (404) or other failure
    pub async fn mark_conversation_seen(&self, role: Role, conversation_id: &str) -> ApiResult<()> {
        let request = self
            .http
            .put(format!(
                "{}/api/chat/conversations/{}/seen",
                self.base_url, conversation_id
            ))
            .query(&[("role", role.as_str())]);
        self.send(role, request).await?;
        Ok(())
    }

    /// Lists recent notifications, newest first.
    ///
    /// # Errors
    ///
    /// * [`ApiError::Unauthenticated`] - No token for `role`
    /// * [`ApiError::ServerError`] - Non-success status
    /// * [`ApiError::InvalidResponse`] - Response could not be parsed
    pub async fn list_notifications(&self, role: Role) -> ApiResult<Vec<Notification>> {
        let request = self
            .http
            .get(format!("{}/api/notifications", self.base_url));
        let res = self.send(role, request).await?;
        Self::listing(res).await
    }

    /// Marks one notification read.
    ///
    /// # Errors
    ///
    /// * [`ApiError::Unauthenticated`] - No token for `role`
    /// * [`ApiError::ServerError`] - Notification not found (404) or other failure
    pub async fn mark_notification_read(&self, role: Role, id: &str) -> ApiResult<()> {
        let request = self
            .http
            .put(format!("{}/api/notifications/{}/read", self.base_url, id));
        self.send(role, request).await?;
        Ok(())
    }

    /// Marks every notification read.
    ///
    /// # Errors
    ///
    /// * [`ApiError::Unauthenticated`] - No token for `role`
    /// * [`ApiError::ServerError`] - Non-success status
    pub async fn mark_all_notifications_read(&self, role: Role) -> ApiResult<()> {
        let request = self
            .http
            .put(format!("{}/api/notifications/read-all", self.base_url));
        self.send(role, request).await?;
        Ok(())
    }

    async fn send(&self, role: Role, request: RequestBuilder) -> ApiResult<Response> {
        let token = self
            .tokens
            .access_token(role)
            .ok_or(ApiError::Unauthenticated(role))?;
        let res = request.bearer_auth(token).send().await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ApiError::ServerError {
                status: status.as_u16(),
                message: res.text().await.unwrap_or_default(),
            });
        }
        Ok(res)
    }

    async fn listing<T: DeserializeOwned>(res: Response) -> ApiResult<Vec<T>> {
        res.json::<Listing<T>>()
            .await
            .map(Listing::into_vec)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HistoryService for PortalClient {
    async fn conversations(&self, role: Role) -> Result<Vec<ConversationSummary>, RealtimeError> {
        Ok(self.list_conversations(role).await?)
    }

    async fn mark_as_seen(&self, role: Role, conversation_id: &str) -> Result<(), RealtimeError> {
        Ok(self.mark_conversation_seen(role, conversation_id).await?)
    }
}

#[async_trait]
impl NotificationService for PortalClient {
    async fn recent(&self, role: Role) -> Result<Vec<Notification>, RealtimeError> {
        Ok(self.list_notifications(role).await?)
    }

    async fn mark_read(&self, role: Role, id: &str) -> Result<(), RealtimeError> {
        Ok(self.mark_notification_read(role, id).await?)
    }

    async fn mark_all_read(&self, role: Role) -> Result<(), RealtimeError> {
        Ok(self.mark_all_notifications_read(role).await?)
    }
}
