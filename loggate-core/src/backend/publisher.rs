use super::NotificationParams;
use crate::{GateError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::sync::Arc;

/// Delivers completion events. Delivery is acknowledged by the provider once
/// and never retried here.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, topic: &str, message: &str) -> Result<()>;
}

pub async fn build_publisher(params: &NotificationParams) -> Result<Arc<dyn NotificationPublisher>> {
    let publisher: Arc<dyn NotificationPublisher> = match params {
        NotificationParams::Log => Arc::new(LogPublisher),
        NotificationParams::Redis { url } => Arc::new(RedisPublisher::connect(url).await?),
        NotificationParams::Webhook { url } => Arc::new(WebhookPublisher::new(url)?),
    };
    Ok(publisher)
}

/// Writes events to the log instead of a message bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl NotificationPublisher for LogPublisher {
    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        tracing::info!("notification on topic {}: {}", topic, message);
        Ok(())
    }
}

/// Redis pub/sub: `PUBLISH topic message`.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|error| GateError::Config(format!("invalid redis url: {}", error)))?;
        let conn = ConnectionManager::new(client).await.map_err(|error| {
            GateError::BackendUnavailable(format!("redis connection failed: {}", error))
        })?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl NotificationPublisher for RedisPublisher {
    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(topic, message).await.map_err(|error| {
            GateError::BackendUnavailable(format!(
                "redis publish to {} failed: {}",
                topic, error
            ))
        })?;

        tracing::debug!("published to {} ({} receivers)", topic, receivers);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookEvent<'a> {
    topic: &'a str,
    message: &'a str,
}

/// HTTP webhook: `POST url` with `{"topic": .., "message": ..}`.
#[derive(Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(GateError::Config("webhook url cannot be empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationPublisher for WebhookPublisher {
    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookEvent { topic, message })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| {
                GateError::BackendUnavailable(format!(
                    "webhook publish to {} failed: {}",
                    self.url, error
                ))
            })?;

        tracing::debug!("published to {} via {}", topic, self.url);
        Ok(())
    }
}
