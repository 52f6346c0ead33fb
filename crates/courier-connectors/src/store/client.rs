//! REST client for the external notification store.
//!
//! [`NotificationStoreClient`] covers the store operations the pipeline
//! needs: paginated listing, single-record reads and writes, read/sent
//! marking and the authoritative [`StatsAggregate`] used for resync.
//!
//! ```text
//! GET    /notifications?recipient_id=&type=&read=&page=&limit=
//! GET    /notifications/{id}
//! POST   /notifications
//! DELETE /notifications/{id}
//! POST   /notifications/{id}/read
//! POST   /notifications/read            {"ids": [...]}
//! POST   /notifications/read-all        {"recipient_id": "..."}
//! POST   /notifications/{id}/sent
//! GET    /notifications/stats?recipient_id=
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{DeliveryChannel, Notification, NotificationKind, StatsAggregate};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::StoreConfig;
use crate::error::ConnectorError;

/// Filters and pagination for [`NotificationStoreClient::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Only notifications for this recipient.
    pub recipient_id: Option<String>,
    /// Only notifications of this kind.
    pub kind: Option<NotificationKind>,
    /// Only read (`true`) or unread (`false`) notifications.
    pub read: Option<bool>,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            recipient_id: None,
            kind: None,
            read: None,
            page: 1,
            limit: 20,
        }
    }
}

impl ListQuery {
    /// Lists notifications for one recipient.
    #[must_use]
    pub fn for_recipient(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: Some(recipient_id.into()),
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(ref recipient) = self.recipient_id {
            params.push(("recipient_id", recipient.clone()));
        }
        if let Some(kind) = self.kind {
            params.push(("type", kind.as_str().to_string()));
        }
        if let Some(read) = self.read {
            params.push(("read", read.to_string()));
        }
        params
    }
}

/// One page of notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPage {
    /// Notifications on this page, newest first.
    pub items: Vec<Notification>,
    /// Total matching notifications across all pages.
    pub total: u64,
    /// Page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl NotificationPage {
    /// Returns `true` if later pages exist.
    #[must_use]
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.limit) < self.total
    }
}

/// Request body for creating a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNotification {
    /// Addressee.
    pub recipient_id: String,
    /// Kind.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Delivery channel.
    pub channel: DeliveryChannel,
    /// Planned delivery time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl NewNotification {
    /// Creates an in-app notification request.
    pub fn new(
        recipient_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            channel: DeliveryChannel::default(),
            scheduled_for: None,
        }
    }
}

#[derive(Serialize)]
struct MarkManyRequest<'a> {
    ids: &'a [String],
}

#[derive(Serialize)]
struct MarkAllRequest<'a> {
    recipient_id: &'a str,
}

#[derive(Deserialize)]
struct UpdatedResponse {
    updated: u64,
}

/// Source of authoritative counters and recent notifications.
///
/// Implemented by [`NotificationStoreClient`]; the live stats loop depends
/// on this trait only.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Fetches the authoritative aggregate.
    async fn fetch_stats(&self, recipient_id: Option<&str>)
        -> Result<StatsAggregate, ConnectorError>;

    /// Fetches the newest notifications, newest first.
    async fn fetch_recent(
        &self,
        recipient_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Notification>, ConnectorError>;
}

/// Async client for the notification store REST API.
pub struct NotificationStoreClient {
    client: Client,
    config: StoreConfig,
}

impl NotificationStoreClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the config is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: StoreConfig) -> Result<Self, ConnectorError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConnectorError::ConfigurationError(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Returns the base URL of the store.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Lists notifications matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn list(&self, query: &ListQuery) -> Result<NotificationPage, ConnectorError> {
        let req = self
            .client
            .get(self.url("/notifications"))
            .query(&query.params());
        self.json(req).await
    }

    /// Fetches one notification.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` (status 404 if it does not exist).
    pub async fn get(&self, id: &str) -> Result<Notification, ConnectorError> {
        let req = self.client.get(self.url(&format!("/notifications/{id}")));
        self.json(req).await
    }

    /// Creates a notification and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn create(&self, new: &NewNotification) -> Result<Notification, ConnectorError> {
        let req = self.client.post(self.url("/notifications")).json(new);
        self.json(req).await
    }

    /// Deletes a notification.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn delete(&self, id: &str) -> Result<(), ConnectorError> {
        let req = self
            .client
            .delete(self.url(&format!("/notifications/{id}")));
        self.execute(req).await.map(drop)
    }

    /// Marks one notification read and returns the updated record.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn mark_read(&self, id: &str) -> Result<Notification, ConnectorError> {
        let req = self
            .client
            .post(self.url(&format!("/notifications/{id}/read")));
        self.json(req).await
    }

    /// Marks several notifications read. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn mark_read_many(&self, ids: &[String]) -> Result<u64, ConnectorError> {
        let req = self
            .client
            .post(self.url("/notifications/read"))
            .json(&MarkManyRequest { ids });
        let resp: UpdatedResponse = self.json(req).await?;
        Ok(resp.updated)
    }

    /// Marks every notification of `recipient_id` read. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn mark_all_read(&self, recipient_id: &str) -> Result<u64, ConnectorError> {
        let req = self
            .client
            .post(self.url("/notifications/read-all"))
            .json(&MarkAllRequest { recipient_id });
        let resp: UpdatedResponse = self.json(req).await?;
        Ok(resp.updated)
    }

    /// Marks one notification sent and returns the updated record.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn mark_sent(&self, id: &str) -> Result<Notification, ConnectorError> {
        let req = self
            .client
            .post(self.url(&format!("/notifications/{id}/sent")));
        self.json(req).await
    }

    /// Fetches the authoritative counters, optionally for one recipient.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Store` if the request fails.
    pub async fn stats(&self, recipient_id: Option<&str>) -> Result<StatsAggregate, ConnectorError> {
        let mut req = self.client.get(self.url("/notifications/stats"));
        if let Some(recipient) = recipient_id {
            req = req.query(&[("recipient_id", recipient)]);
        }
        self.json(req).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn execute(&self, mut req: RequestBuilder) -> Result<Response, ConnectorError> {
        if let Some(ref token) = self.config.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectorError::Timeout(as_millis(self.config.request_timeout))
            } else {
                ConnectorError::Store {
                    status: 0,
                    message: e.to_string(),
                }
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %text, "store request rejected");
            return Err(ConnectorError::Store {
                status: status.as_u16(),
                message: if text.is_empty() {
                    status.to_string()
                } else {
                    text
                },
            });
        }
        Ok(resp)
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ConnectorError> {
        let resp = self.execute(req).await?;
        let status = resp.status().as_u16();
        resp.json::<T>().await.map_err(|e| ConnectorError::Store {
            status,
            message: format!("failed to parse store response: {e}"),
        })
    }
}

#[async_trait]
impl StatsSource for NotificationStoreClient {
    async fn fetch_stats(
        &self,
        recipient_id: Option<&str>,
    ) -> Result<StatsAggregate, ConnectorError> {
        self.stats(recipient_id).await
    }

    async fn fetch_recent(
        &self,
        recipient_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Notification>, ConnectorError> {
        let query = ListQuery {
            recipient_id: recipient_id.map(str::to_string),
            limit,
            ..ListQuery::default()
        };
        Ok(self.list(&query).await?.items)
    }
}

impl std::fmt::Debug for NotificationStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStoreClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_millis(d: std::time::Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{DELETE, GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn notification_json(id: &str, read: bool) -> serde_json::Value {
        json!({
            "id": id,
            "recipient_id": "u1",
            "type": "booking",
            "title": "Booking confirmed",
            "message": "See you at 10:00",
            "read": read,
            "read_at": if read { json!("2024-05-01T10:00:00Z") } else { json!(null) },
            "channel": "in-app",
            "sent": false,
            "created_at": "2024-05-01T09:00:00Z",
            "updated_at": "2024-05-01T09:00:00Z"
        })
    }

    fn client(server: &MockServer) -> NotificationStoreClient {
        let mut config = StoreConfig::new(server.base_url());
        config.auth_token = Some("token-1".into());
        NotificationStoreClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_list_sends_filters() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/notifications")
                    .query_param("recipient_id", "u1")
                    .query_param("read", "false")
                    .query_param("type", "booking")
                    .query_param("page", "2")
                    .query_param("limit", "1")
                    .header("authorization", "Bearer token-1");
                then.status(200).json_body(json!({
                    "items": [notification_json("n-2", false)],
                    "total": 3,
                    "page": 2,
                    "limit": 1
                }));
            })
            .await;

        let query = ListQuery {
            kind: Some(NotificationKind::Booking),
            read: Some(false),
            page: 2,
            limit: 1,
            ..ListQuery::for_recipient("u1")
        };
        let page = client(&server).list(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "n-2");
        assert!(page.has_more());
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/notifications/missing");
                then.status(404).body("not found");
            })
            .await;

        let err = client(&server).get("missing").await.unwrap_err();
        assert!(matches!(err, ConnectorError::Store { status: 404, ref message } if message == "not found"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/notifications/stats");
                then.status(503);
            })
            .await;

        let err = client(&server).stats(None).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Store { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_create_and_mark() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/notifications")
                    .json_body(json!({
                        "recipient_id": "u1",
                        "type": "booking",
                        "title": "Booking confirmed",
                        "message": "See you at 10:00",
                        "channel": "in-app"
                    }));
                then.status(201).json_body(notification_json("n-1", false));
            })
            .await;
        let read = server
            .mock_async(|when, then| {
                when.method(POST).path("/notifications/n-1/read");
                then.status(200).json_body(notification_json("n-1", true));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/notifications/n-1");
                then.status(204);
            })
            .await;

        let client = client(&server);
        let created = client
            .create(&NewNotification::new(
                "u1",
                NotificationKind::Booking,
                "Booking confirmed",
                "See you at 10:00",
            ))
            .await
            .unwrap();
        assert_eq!(created.id, "n-1");
        assert!(!created.read);

        let updated = client.mark_read("n-1").await.unwrap();
        assert!(updated.read);
        assert!(updated.read_at.is_some());

        client.delete("n-1").await.unwrap();

        create.assert_async().await;
        read.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_bulk_mark_read() {
        let server = MockServer::start_async().await;
        let many = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/notifications/read")
                    .json_body(json!({ "ids": ["a", "b"] }));
                then.status(200).json_body(json!({ "updated": 2 }));
            })
            .await;
        let all = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/notifications/read-all")
                    .json_body(json!({ "recipient_id": "u1" }));
                then.status(200).json_body(json!({ "updated": 5 }));
            })
            .await;

        let client = client(&server);
        assert_eq!(
            client
                .mark_read_many(&["a".to_string(), "b".to_string()])
                .await
                .unwrap(),
            2
        );
        assert_eq!(client.mark_all_read("u1").await.unwrap(), 5);
        many.assert_async().await;
        all.assert_async().await;
    }

    #[tokio::test]
    async fn test_stats_source() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/notifications/stats")
                    .query_param("recipient_id", "u1");
                then.status(200).json_body(json!({
                    "total": 4, "unread": 3, "sent": 1, "pending": 3, "read": 1
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/notifications")
                    .query_param("limit", "50");
                then.status(200).json_body(json!({
                    "items": [notification_json("n-1", true), notification_json("n-0", false)],
                    "total": 2,
                    "page": 1,
                    "limit": 50
                }));
            })
            .await;

        let source: &dyn StatsSource = &client(&server);
        assert_eq!(
            source.fetch_stats(Some("u1")).await.unwrap(),
            StatsAggregate::new(4, 3, 1, 3, 1)
        );
        let recent = source.fetch_recent(Some("u1"), 50).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "n-1");
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let mut config = StoreConfig::new("http://127.0.0.1:9");
        config.request_timeout = std::time::Duration::from_millis(500);
        let client = NotificationStoreClient::new(config).unwrap();

        let err = client.stats(None).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
