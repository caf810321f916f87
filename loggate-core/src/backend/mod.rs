//! Storage and notification backends for accepted transfers.
//!
//! A backend stores one accepted payload under a unique key and announces it
//! on a topic. Two variants exist: [`DebugBackend`] only logs, and
//! [`ObjectStoreBackend`] writes to an object store and publishes through a
//! [`NotificationPublisher`].

pub mod debug;
pub mod publisher;
pub mod store;

pub use debug::DebugBackend;
pub use publisher::{LogPublisher, NotificationPublisher, RedisPublisher, WebhookPublisher};
pub use store::ObjectStoreBackend;

use crate::{GateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Suffix appended to every generated object key.
pub const OBJECT_KEY_SUFFIX: &str = ".wibl";

/// Where one accepted payload goes. Built fresh per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub destination: String,
    pub object_key: String,
    pub size_bytes: u64,
}

impl ObjectDescriptor {
    /// Descriptor with a fresh random key, so no two uploads share a name.
    pub fn for_payload(destination: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            destination: destination.into(),
            object_key: format!("{}{}", Uuid::new_v4(), OBJECT_KEY_SUFFIX),
            size_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    Debug,
    Aws,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotificationParams {
    #[default]
    Log,
    Redis {
        url: String,
    },
    Webhook {
        url: String,
    },
}

/// Missing fields take their defaults, so a config file may name only the
/// fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendParams {
    pub region: String,
    pub endpoint: Option<String>,
    pub upload_bucket: String,
    #[serde(alias = "sns_topic")]
    pub topic: String,
    pub notification: NotificationParams,
    pub allow_http: bool,
}

impl Default for BackendParams {
    fn default() -> Self {
        Self {
            region: "us-east-2".to_string(),
            endpoint: None,
            upload_bucket: "UNHJHC-wibl-incoming".to_string(),
            topic: "UNHJHC-wibl-conversion".to_string(),
            notification: NotificationParams::Log,
            allow_http: false,
        }
    }
}

/// Every operation other than `configure` fails with `NotConfigured` until
/// `configure` has succeeded once.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Set up clients. The first successful call wins; later calls are no-ops.
    async fn configure(&self, params: &BackendParams) -> Result<()>;

    /// `Ok(false)` means the destination is missing (a configuration problem);
    /// `Err` means the provider could not answer.
    async fn destination_exists(&self, descriptor: &ObjectDescriptor) -> Result<bool>;

    /// Write the whole payload under the descriptor's key, or nothing.
    async fn upload(&self, descriptor: &ObjectDescriptor, payload: Bytes) -> Result<()>;

    /// Publish a completion event for the descriptor on `topic`. Not retried.
    async fn notify(&self, topic: &str, descriptor: &ObjectDescriptor) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct BackendBuilder {
    provider: Option<BackendProvider>,
    params: Option<BackendParams>,
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: BackendProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn params(mut self, params: BackendParams) -> Self {
        self.params = Some(params);
        self
    }

    fn resolve_params(&self) -> Result<&BackendParams> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| GateError::Config("backend parameters are required".to_string()))?;

        if params.upload_bucket.trim().is_empty() {
            return Err(GateError::Config(
                "upload bucket cannot be empty".to_string(),
            ));
        }
        if params.topic.trim().is_empty() {
            return Err(GateError::Config(
                "notification topic cannot be empty".to_string(),
            ));
        }

        Ok(params)
    }

    pub fn build(&self) -> Result<Arc<dyn StorageBackend>> {
        let provider = self
            .provider
            .ok_or_else(|| GateError::Config("backend provider is required".to_string()))?;

        let backend: Arc<dyn StorageBackend> = match provider {
            BackendProvider::Debug => Arc::new(DebugBackend::new()),
            BackendProvider::Aws => Arc::new(ObjectStoreBackend::new()),
        };
        Ok(backend)
    }

    /// Build the backend and configure it once, so requests share its clients.
    pub async fn build_configured(&self) -> Result<Arc<dyn StorageBackend>> {
        let params = self.resolve_params()?;
        let backend = self.build()?;
        backend.configure(params).await?;

        tracing::info!(
            "{} backend configured for bucket {} and topic {}",
            backend.name(),
            params.upload_bucket,
            params.topic
        );
        Ok(backend)
    }
}
