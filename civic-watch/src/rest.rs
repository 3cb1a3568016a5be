//! REST client for the CivicFix API.

use async_trait::async_trait;
use civic_core::{IssueId, ListingPage, ListingQuery, SessionIdentity};
use civic_live::{ApiError, IssueApi, VoteReceipt};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationList {
    #[serde(default)]
    notifications: Vec<NotificationEntry>,
}

#[derive(Debug, Deserialize)]
struct NotificationEntry {
    #[serde(default)]
    is_read: bool,
}

/// [`IssueApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIssueApi {
    base_url: String,
    http: reqwest::Client,
}

impl HttpIssueApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        identity: &SessionIdentity,
    ) -> reqwest::RequestBuilder {
        match &identity.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ApiError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Map a non-success response to [`ApiError::Status`], keeping the
/// server's `error` text when the body carries one.
fn status_error(code: u16, body: &[u8]) -> ApiError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error);
    ApiError::Status { code, message }
}

fn unread_count(list: &NotificationList) -> u32 {
    list.notifications.iter().filter(|n| !n.is_read).count() as u32
}

fn network(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

#[async_trait]
impl IssueApi for HttpIssueApi {
    async fn fetch_listing(
        &self,
        query: &ListingQuery,
        identity: &SessionIdentity,
    ) -> Result<ListingPage, ApiError> {
        debug!("GET /api/issues page {}", query.page);
        let request = self
            .http
            .get(self.url("/api/issues"))
            .query(&query.query_pairs());
        let response = self
            .authorized(request, identity)
            .send()
            .await
            .map_err(network)?;
        Self::read_json(response).await
    }

    async fn submit_vote(
        &self,
        issue: IssueId,
        identity: &SessionIdentity,
    ) -> Result<VoteReceipt, ApiError> {
        debug!("POST vote on issue {issue}");
        let request = self
            .http
            .post(self.url(&format!("/api/issues/{}/vote", issue.0)));
        let response = self
            .authorized(request, identity)
            .send()
            .await
            .map_err(network)?;
        Self::read_json(response).await.inspect_err(|e| {
            warn!("Vote on issue {issue} failed: {e}");
        })
    }

    async fn fetch_unread_count(&self, identity: &SessionIdentity) -> Result<u32, ApiError> {
        let request = self.http.get(self.url("/api/notifications"));
        let response = self
            .authorized(request, identity)
            .send()
            .await
            .map_err(network)?;
        let list: NotificationList = Self::read_json(response).await?;
        Ok(unread_count(&list))
    }
}
