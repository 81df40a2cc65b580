//! RabbitMQ publisher
//!
//! Talks to the broker's management HTTP API: the queue is declared
//! durable once, then each event is published through the default
//! exchange with `delivery_mode = 2` (persistent).

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use super::{EventPublisher, QueuedEvent};
use crate::config::AppConfig;
use crate::error::{AuditError, AuditResult};

const PERSISTENT: u8 = 2;

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

pub struct RabbitMqPublisher {
    api_url: String,
    username: String,
    password: String,
    vhost: String,
    queue: String,
    http_client: Client,
    declared: OnceCell<()>,
}

impl RabbitMqPublisher {
    pub fn new(
        api_url: String,
        username: String,
        password: String,
        vhost: String,
        queue: String,
    ) -> Self {
        Self {
            api_url,
            username,
            password,
            vhost,
            queue,
            http_client: Client::new(),
            declared: OnceCell::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rabbitmq_api_url.clone(),
            config.rabbitmq_user.clone(),
            config.rabbitmq_pass.clone(),
            config.rabbitmq_vhost.clone(),
            config.audit_queue.clone(),
        )
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// `{api_url}/api/<segments...>`, each segment percent-encoded
    /// (the default vhost `/` becomes `%2F`)
    fn endpoint(&self, segments: &[&str]) -> AuditResult<Url> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| AuditError::Queue(format!("Invalid RabbitMQ API URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| AuditError::Queue("RabbitMQ API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);

        Ok(url)
    }

    async fn declare_queue(&self) -> AuditResult<()> {
        let url = self.endpoint(&["queues", &self.vhost, &self.queue])?;
        debug!("Declaring durable queue {}", self.queue);

        let response = self
            .http_client
            .put(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "durable": true, "auto_delete": false }))
            .send()
            .await
            .map_err(|e| AuditError::Queue(format!("Queue declaration failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuditError::Queue(format!(
                "Queue declaration returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RabbitMqPublisher {
    async fn publish(&self, event: &QueuedEvent) -> AuditResult<()> {
        self.declared
            .get_or_try_init(|| self.declare_queue())
            .await?;

        let url = self.endpoint(&["exchanges", &self.vhost, "amq.default", "publish"])?;
        let message_id = Uuid::new_v4().to_string();

        let body = json!({
            "properties": {
                "delivery_mode": PERSISTENT,
                "content_type": "application/json",
                "message_id": message_id,
            },
            "routing_key": self.queue,
            "payload": event.to_json()?,
            "payload_encoding": "string",
        });

        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuditError::Queue(format!("Publish request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuditError::Queue(format!(
                "Publish returned {}",
                response.status()
            )));
        }

        let result: PublishResponse = response
            .json()
            .await
            .map_err(|e| AuditError::Queue(format!("Unexpected publish response: {}", e)))?;

        if !result.routed {
            return Err(AuditError::Queue(format!(
                "Message was not routed to queue {}",
                self.queue
            )));
        }

        info!(
            queue = %self.queue,
            message_id = %message_id,
            "Published {} event",
            event.event_type
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EventData;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(uri: String) -> RabbitMqPublisher {
        RabbitMqPublisher::new(
            uri,
            "guest".to_string(),
            "guest".to_string(),
            "/".to_string(),
            "audit_events".to_string(),
        )
    }

    #[test]
    fn test_default_vhost_is_encoded() {
        let publisher = publisher("http://localhost:15672/".to_string());
        let url = publisher
            .endpoint(&["exchanges", "/", "amq.default", "publish"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:15672/api/exchanges/%2F/amq.default/publish"
        );
    }

    #[tokio::test]
    async fn test_publish_declares_queue_once_and_sends_persistent_message() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/queues/%2F/audit_events"))
            .and(basic_auth("guest", "guest"))
            .and(body_partial_json(json!({ "durable": true })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let event = QueuedEvent::new("queued_event", EventData::new().with("from_cli", true));
        Mock::given(method("POST"))
            .and(path("/api/exchanges/%2F/amq.default/publish"))
            .and(body_partial_json(json!({
                "properties": { "delivery_mode": 2 },
                "routing_key": "audit_events",
                "payload": event.to_json().unwrap(),
                "payload_encoding": "string",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "routed": true })))
            .expect(2)
            .mount(&server)
            .await;

        let publisher = publisher(server.uri());
        publisher.publish(&event).await.unwrap();
        publisher.publish(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_unrouted_message_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "routed": false })))
            .mount(&server)
            .await;

        let event = QueuedEvent::new("queued_event", EventData::new());
        let err = publisher(server.uri()).publish(&event).await.unwrap_err();
        assert!(matches!(err, AuditError::Queue(_)));
    }

    #[tokio::test]
    async fn test_broker_unavailable_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let event = QueuedEvent::new("queued_event", EventData::new());
        let err = publisher(server.uri()).publish(&event).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
