//! Asynchronous event delivery
//!
//! Events can be handed to a durable queue instead of being written to the
//! chain directly; a consumer appends them later. Publishing is
//! fire-and-forget: no consumer acknowledgement is awaited.

pub mod rabbitmq;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::EventData;
use crate::error::AuditResult;

pub use rabbitmq::RabbitMqPublisher;

/// Message body published to the queue: `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

impl QueuedEvent {
    pub fn new(event_type: impl Into<String>, data: EventData) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn to_json(&self) -> AuditResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one persistent message to the configured queue
    async fn publish(&self, event: &QueuedEvent) -> AuditResult<()>;
}
