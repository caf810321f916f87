use super::publisher::build_publisher;
use super::{BackendParams, NotificationPublisher, ObjectDescriptor, StorageBackend};
use crate::{GateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tokio::sync::OnceCell;

struct Clients {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn NotificationPublisher>,
}

/// Object store uploads plus pub/sub completion events.
///
/// Clients are created by the first `configure` call and shared by every
/// request afterwards.
pub struct ObjectStoreBackend {
    clients: OnceCell<Clients>,
    injected: Option<(Arc<dyn ObjectStore>, Arc<dyn NotificationPublisher>)>,
}

impl Default for ObjectStoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStoreBackend {
    /// `configure` builds an S3 client for the upload bucket and the publisher
    /// named by the notification parameters.
    pub fn new() -> Self {
        Self {
            clients: OnceCell::new(),
            injected: None,
        }
    }

    /// Use the given clients instead of building them; `configure` still has
    /// to be called to bind the upload bucket.
    pub fn with_clients(
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            clients: OnceCell::new(),
            injected: Some((store, publisher)),
        }
    }

    fn clients(&self) -> Result<&Clients> {
        self.clients.get().ok_or(GateError::NotConfigured)
    }

    async fn build_clients(&self, params: &BackendParams) -> Result<Clients> {
        if let Some((store, publisher)) = &self.injected {
            return Ok(Clients {
                bucket: params.upload_bucket.clone(),
                store: store.clone(),
                publisher: publisher.clone(),
            });
        }

        // Credentials come from the standard AWS_* environment variables.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(params.region.clone())
            .with_bucket_name(params.upload_bucket.clone());
        if let Some(endpoint) = &params.endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }
        if params.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|error| {
            GateError::Config(format!("failed to build object store client: {}", error))
        })?;
        let publisher = build_publisher(&params.notification).await?;

        Ok(Clients {
            bucket: params.upload_bucket.clone(),
            store: Arc::new(store),
            publisher,
        })
    }
}

fn is_missing_bucket(error: &object_store::Error) -> bool {
    match error {
        object_store::Error::NotFound { .. } => true,
        other => other.to_string().contains("NoSuchBucket"),
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "object-store"
    }

    async fn configure(&self, params: &BackendParams) -> Result<()> {
        let clients = self
            .clients
            .get_or_try_init(|| self.build_clients(params))
            .await?;

        tracing::debug!("object store backend bound to bucket {}", clients.bucket);
        Ok(())
    }

    async fn destination_exists(&self, descriptor: &ObjectDescriptor) -> Result<bool> {
        let clients = self.clients()?;
        tracing::debug!("checking for bucket {}", descriptor.destination);

        if descriptor.destination != clients.bucket {
            tracing::warn!(
                "destination {} is not the configured bucket {}",
                descriptor.destination,
                clients.bucket
            );
            return Ok(false);
        }

        match clients.store.list_with_delimiter(None).await {
            Ok(_) => {
                tracing::debug!("bucket {} exists and is accessible", clients.bucket);
                Ok(true)
            }
            Err(error) if is_missing_bucket(&error) => {
                tracing::warn!("bucket {} does not exist", clients.bucket);
                Ok(false)
            }
            Err(error) => {
                tracing::error!(
                    "either bucket {} is not accessible or the provider failed: {}",
                    clients.bucket,
                    error
                );
                Err(GateError::BackendUnavailable(format!(
                    "bucket check for {} failed: {}",
                    clients.bucket, error
                )))
            }
        }
    }

    async fn upload(&self, descriptor: &ObjectDescriptor, payload: Bytes) -> Result<()> {
        let clients = self.clients()?;
        if descriptor.destination != clients.bucket {
            return Err(GateError::BackendUnavailable(format!(
                "destination {} is not configured",
                descriptor.destination
            )));
        }

        tracing::debug!(
            "transferring {} to bucket {} ({} bytes)",
            descriptor.object_key,
            descriptor.destination,
            descriptor.size_bytes
        );

        let location = ObjectPath::from(descriptor.object_key.as_str());
        clients
            .store
            .put(&location, PutPayload::from(payload))
            .await
            .map_err(|error| {
                tracing::error!(
                    "upload of {}:{} failed: {}",
                    descriptor.destination,
                    descriptor.object_key,
                    error
                );
                GateError::from(error)
            })?;

        Ok(())
    }

    async fn notify(&self, topic: &str, descriptor: &ObjectDescriptor) -> Result<()> {
        let clients = self.clients()?;
        tracing::debug!("publishing key {} on topic {}", descriptor.object_key, topic);

        let message = serde_json::to_string(descriptor)?;
        clients.publisher.publish(topic, &message).await
    }
}
