use super::{BackendParams, ObjectDescriptor, StorageBackend};
use crate::{GateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend that accepts everything and only logs what it would have done.
#[derive(Debug, Default)]
pub struct DebugBackend {
    params: OnceLock<BackendParams>,
    uploads: AtomicUsize,
    notifications: AtomicUsize,
}

impl DebugBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.params.get().is_some()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.load(Ordering::Relaxed)
    }

    fn params(&self) -> Result<&BackendParams> {
        self.params.get().ok_or(GateError::NotConfigured)
    }
}

#[async_trait]
impl StorageBackend for DebugBackend {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn configure(&self, params: &BackendParams) -> Result<()> {
        let params = self.params.get_or_init(|| params.clone());
        tracing::info!(
            "debug backend: configure for region {}, bucket {}, topic {}",
            params.region,
            params.upload_bucket,
            params.topic
        );
        Ok(())
    }

    async fn destination_exists(&self, descriptor: &ObjectDescriptor) -> Result<bool> {
        self.params()?;
        tracing::info!(
            "debug backend: check for existence of {:?} for upload",
            descriptor.destination
        );
        Ok(true)
    }

    async fn upload(&self, descriptor: &ObjectDescriptor, payload: Bytes) -> Result<()> {
        self.params()?;
        tracing::info!(
            "debug backend: upload to {:?} with key {:?} for data of length {}",
            descriptor.destination,
            descriptor.object_key,
            payload.len()
        );
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn notify(&self, topic: &str, descriptor: &ObjectDescriptor) -> Result<()> {
        self.params()?;
        tracing::info!(
            "debug backend: notification on topic {:?} for key {:?}",
            topic,
            descriptor.object_key
        );
        self.notifications.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
