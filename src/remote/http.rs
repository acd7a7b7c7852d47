//! JSON/HTTP client for a studio control plane.
//!
//! This module talks to a REST API exposing `/studios`, `/studios/{id}` and
//! `/studios/{id}/tags`. Reads are retried on transient failures; mutations
//! are sent exactly once and any failure is surfaced to the caller.

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result, StudioError};
use crate::resource::{
    ATTR_NAME, AttributeValue, ChangeSet, DesiredConfiguration, ObservedState, ResourceId,
};

use super::client::RemoteClient;
use super::types::{
    ApiErrorBody, CreateStudioRequest, Studio, StudioList, TagStudioRequest, UpdateStudioRequest,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retries for idempotent reads.
const DEFAULT_READ_RETRIES: u32 = 3;

/// Delay between read retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Fallback when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Studio control plane client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStudioClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// Optional bearer token.
    token: Option<String>,
    /// Retries for idempotent reads.
    read_retries: u32,
}

impl HttpStudioClient {
    /// Creates a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                RemoteError::transport(
                    "connect",
                    endpoint,
                    format!("Failed to create HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            token: None,
            read_retries: DEFAULT_READ_RETRIES,
        })
    }

    /// Creates a client from the `remote` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &RemoteConfig, token: Option<String>) -> Result<Self> {
        let client = Self::with_timeout(&config.endpoint, config.request_timeout_secs)?;
        Ok(match token {
            Some(token) => client.with_token(token),
            None => client,
        })
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets how often idempotent reads are retried on transient failures.
    #[must_use]
    pub const fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        trace!("{method} {url}");

        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Sends a request once and maps the response status to an error.
    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &str,
        resource: &str,
    ) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| {
                RemoteError::transport(operation, resource, format!("Request failed: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(RemoteError::not_found(resource).into()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(StudioError::Remote(RemoteError::Authentication {
                    message: Self::error_message(response).await,
                }))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                Err(StudioError::Remote(RemoteError::RateLimited {
                    retry_after_secs: retry_after,
                }))
            }
            StatusCode::CONFLICT => Err(RemoteError::conflict(
                operation,
                resource,
                Self::error_message(response).await,
            )
            .into()),
            _ => Err(
                RemoteError::api_error(status.as_u16(), Self::error_message(response).await).into(),
            ),
        }
    }

    /// Sends an idempotent request, retrying transient failures.
    async fn send_with_retry<F>(&self, build: F, operation: &str, resource: &str) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.send(build(), operation, resource).await {
                Err(e) if e.is_retryable() && attempt < self.read_retries => {
                    attempt += 1;
                    debug!(
                        "Retry attempt {attempt} of {} for {operation} {resource}: {e}",
                        self.read_retries
                    );
                    tokio::time::sleep(Self::retry_delay(&e, attempt)).await;
                }
                other => return other,
            }
        }
    }

    /// Delay before retry `attempt`. A 429 waits for its `Retry-After`.
    fn retry_delay(error: &StudioError, attempt: u32) -> Duration {
        let backoff = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
        match error {
            StudioError::Remote(RemoteError::RateLimited { .. }) => {
                error.retry_delay_secs().map_or(backoff, Duration::from_secs)
            }
            _ => backoff,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json().await.map_err(|e| {
            StudioError::Remote(RemoteError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })
    }

    async fn error_message(response: Response) -> String {
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body)
    }
}

#[async_trait]
impl RemoteClient for HttpStudioClient {
    async fn create(&self, desired: &DesiredConfiguration) -> Result<ObservedState> {
        let name = desired.name().unwrap_or_default();
        debug!("Creating studio {name}");

        let body = CreateStudioRequest {
            attributes: desired.attributes.clone(),
            tags: desired.tags.clone(),
        };
        let response = self
            .send(self.request(Method::POST, "/studios").json(&body), "create", name)
            .await?;
        let studio: Studio = Self::parse(response).await?;
        Ok(studio.into())
    }

    async fn read(&self, id: &ResourceId) -> Result<ObservedState> {
        let path = format!("/studios/{id}");
        let response = self
            .send_with_retry(|| self.request(Method::GET, &path), "read", id.as_str())
            .await?;
        let studio: Studio = Self::parse(response).await?;
        Ok(studio.into())
    }

    async fn update(&self, id: &ResourceId, changes: &ChangeSet) -> Result<ObservedState> {
        debug!("Updating studio {id}: {changes}");

        if changes.has_attribute_changes() {
            let body = UpdateStudioRequest {
                attributes: changes.attributes.clone(),
            };
            self.send(
                self.request(Method::PATCH, &format!("/studios/{id}")).json(&body),
                "update",
                id.as_str(),
            )
            .await?;
        }

        let upserts = changes.tags.upserts();
        if !upserts.is_empty() {
            let body = TagStudioRequest { tags: upserts };
            self.send(
                self.request(Method::POST, &format!("/studios/{id}/tags")).json(&body),
                "tag",
                id.as_str(),
            )
            .await?;
        }

        if !changes.tags.removed.is_empty() {
            let keys: Vec<(&str, &str)> = changes
                .tags
                .removed
                .iter()
                .map(|k| ("tagKeys", k.as_str()))
                .collect();
            self.send(
                self.request(Method::DELETE, &format!("/studios/{id}/tags")).query(&keys),
                "untag",
                id.as_str(),
            )
            .await?;
        }

        self.read(id).await
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        debug!("Deleting studio {id}");
        let path = format!("/studios/{id}");
        match self.send(self.request(Method::DELETE, &path), "delete", id.as_str()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ObservedState>> {
        let response = self
            .send_with_retry(
                || self.request(Method::GET, "/studios").query(&[("name", name)]),
                "find_by_name",
                name,
            )
            .await?;
        let list: StudioList = Self::parse(response).await?;

        Ok(list
            .studios
            .into_iter()
            .map(ObservedState::from)
            .find(|s| s.attribute(ATTR_NAME).and_then(AttributeValue::as_text) == Some(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{TagDiff, TagSet};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn studio_json(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "arn": format!("arn:aws:elasticmapreduce:us-east-1:000000000000:studio/{id}"),
            "url": format!("https://{id}.emrstudio-prod.us-east-1.amazonaws.com"),
            "status": "available",
            "attributes": { "name": name },
            "tags": {}
        })
    }

    async fn client(server: &MockServer) -> HttpStudioClient {
        HttpStudioClient::new(&server.uri())
            .unwrap()
            .with_read_retries(0)
    }

    #[tokio::test]
    async fn test_create_posts_attributes_and_tags() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/studios"))
            .and(body_json(serde_json::json!({
                "attributes": { "name": "analytics" },
                "tags": { "key1": "value1" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(studio_json("es-1", "analytics")))
            .expect(1)
            .mount(&server)
            .await;

        let desired = DesiredConfiguration::new()
            .with_attribute(ATTR_NAME, AttributeValue::text("analytics"))
            .with_tag("key1", "value1");
        let observed = client(&server).await.create(&desired).await.unwrap();

        assert_eq!(observed.id.as_str(), "es-1");
        assert!(observed.arn.is_some());
    }

    #[tokio::test]
    async fn test_read_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studios/es-gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .read(&ResourceId::new("es-gone"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_500_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studios/es-1"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"message": "boom"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .read(&ResourceId::new("es-1"))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(
            err,
            StudioError::Remote(RemoteError::Api { status: 500, ref message }) if message == "boom"
        ));
    }

    #[tokio::test]
    async fn test_auth_and_rate_limit_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let client = client(&server).await.with_token("secret");
        let err = client.read(&ResourceId::new("es-1")).await.unwrap_err();
        assert!(matches!(err, StudioError::Remote(RemoteError::Authentication { .. })));

        let changes = ChangeSet::new().set(ATTR_NAME, AttributeValue::text("renamed"));
        let err = client.update(&ResourceId::new("es-1"), &changes).await.unwrap_err();
        assert_eq!(err.retry_delay_secs(), Some(7));
    }

    #[test]
    fn test_retry_delay_honours_retry_after() {
        let limited = StudioError::Remote(RemoteError::RateLimited { retry_after_secs: 3 });
        assert_eq!(HttpStudioClient::retry_delay(&limited, 1), Duration::from_secs(3));

        let transport = StudioError::Remote(RemoteError::transport("read", "es-1", "reset"));
        assert_eq!(HttpStudioClient::retry_delay(&transport, 2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_rate_limited_read_waits_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(studio_json("es-1", "a")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server).await.with_read_retries(1);
        let started = std::time::Instant::now();
        let observed = client.read(&ResourceId::new("es-1")).await.unwrap();

        assert_eq!(observed.id, ResourceId::new("es-1"));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studios/es-1"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(studio_json("es-1", "a")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server).await.with_token("secret");
        assert!(client.read(&ResourceId::new("es-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_sends_tag_calls_then_reads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/studios/es-1/tags"))
            .and(body_json(serde_json::json!({ "tags": { "key2": "value2" } })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/studios/es-1/tags"))
            .and(query_param("tagKeys", "key1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(studio_json("es-1", "a")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let observed: TagSet = [(String::from("key1"), String::from("value1"))].into();
        let desired: TagSet = [(String::from("key2"), String::from("value2"))].into();
        let changes = ChangeSet::new().with_tags(TagDiff::compute(&observed, &desired));

        let result = client(&server).await.update(&ResourceId::new("es-1"), &changes).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_conflict_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let changes = ChangeSet::new().set(ATTR_NAME, AttributeValue::text("renamed"));
        let err = client(&server)
            .await
            .update(&ResourceId::new("es-1"), &changes)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_404_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/studios/es-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).await.delete(&ResourceId::new("es-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_find_by_name_filters_exact_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studios"))
            .and(query_param("name", "analytics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "studios": [studio_json("es-1", "analytics-old"), studio_json("es-2", "analytics")]
            })))
            .mount(&server)
            .await;

        let found = client(&server).await.find_by_name("analytics").await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(ResourceId::new("es-2")));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let client = HttpStudioClient::new("http://127.0.0.1:1")
            .unwrap()
            .with_read_retries(0);
        let err = client.read(&ResourceId::new("es-1")).await.unwrap_err();
        assert!(matches!(err, StudioError::Remote(RemoteError::Transport { .. })));
        assert!(!err.is_not_found());
    }
}
