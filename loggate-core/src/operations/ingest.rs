use crate::backend::{BackendParams, ObjectDescriptor, StorageBackend};
use crate::integrity::{TransferVerdict, verify_transfer};
use crate::{GateError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct IngestOperation {
    backend: Arc<dyn StorageBackend>,
    params: Arc<BackendParams>,
}

/// One authenticated transfer.
#[derive(Debug, Clone)]
pub struct IngestOperationRequest {
    pub identity: String,
    pub body: Bytes,
    pub digest_header: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOperationOutcome {
    Stored(ObjectDescriptor),
    Corrupt { expected: String, actual: String },
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Failure,
}

/// Response body of a transfer: `{"status": "success" | "failure"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub status: TransferStatus,
}

impl TransferResult {
    pub fn success() -> Self {
        Self {
            status: TransferStatus::Success,
        }
    }

    pub fn failure() -> Self {
        Self {
            status: TransferStatus::Failure,
        }
    }
}

impl From<&IngestOperationOutcome> for TransferResult {
    fn from(outcome: &IngestOperationOutcome) -> Self {
        match outcome {
            IngestOperationOutcome::Stored(_) => Self::success(),
            _ => Self::failure(),
        }
    }
}

impl IngestOperation {
    pub fn new(backend: Arc<dyn StorageBackend>, params: BackendParams) -> Self {
        Self {
            backend,
            params: Arc::new(params),
        }
    }

    pub async fn run(&self, request: IngestOperationRequest) -> Result<IngestOperationOutcome> {
        let IngestOperationRequest {
            identity,
            body,
            digest_header,
        } = request;

        tracing::info!("transfer from logger {} with {} bytes", identity, body.len());

        match verify_transfer(&body, digest_header.as_deref()) {
            TransferVerdict::Verified => {
                tracing::debug!("recomputed digest matches for logger {}", identity);
            }
            TransferVerdict::Corrupt { expected, actual } => {
                tracing::warn!(
                    "digest from logger {} does not match payload ({} != {})",
                    identity,
                    expected,
                    actual
                );
                return Ok(IngestOperationOutcome::Corrupt { expected, actual });
            }
            TransferVerdict::Malformed(reason) => {
                tracing::warn!("malformed transfer from logger {}: {}", identity, reason);
                return Ok(IngestOperationOutcome::Malformed(reason));
            }
        }

        let descriptor =
            ObjectDescriptor::for_payload(self.params.upload_bucket.clone(), body.len() as u64);

        self.store(&descriptor, body).await.inspect_err(|error| {
            tracing::error!(
                "transfer from logger {} failed at the backend (destination={} key={} size={}): {}",
                identity,
                descriptor.destination,
                descriptor.object_key,
                descriptor.size_bytes,
                error
            );
        })?;

        tracing::info!(
            "stored transfer from logger {} as {}/{}",
            identity,
            descriptor.destination,
            descriptor.object_key
        );
        Ok(IngestOperationOutcome::Stored(descriptor))
    }

    async fn store(&self, descriptor: &ObjectDescriptor, body: Bytes) -> Result<()> {
        self.backend.configure(&self.params).await?;

        if !self.backend.destination_exists(descriptor).await? {
            return Err(GateError::DestinationMissing(descriptor.destination.clone()));
        }

        self.backend.upload(descriptor, body).await?;
        self.backend.notify(&self.params.topic, descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DebugBackend;
    use crate::integrity::DigestAlgorithm;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingBackend {
        destination_missing: bool,
        fail_destination_check: bool,
        fail_upload: bool,
        fail_notify: bool,
        configures: AtomicUsize,
        checks: AtomicUsize,
        uploads: Mutex<Vec<(ObjectDescriptor, Bytes)>>,
        notifications: Mutex<Vec<(String, ObjectDescriptor)>>,
    }

    impl RecordingBackend {
        fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }

        fn notify_count(&self) -> usize {
            self.notifications.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StorageBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn configure(&self, _params: &BackendParams) -> Result<()> {
            self.configures.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn destination_exists(&self, _descriptor: &ObjectDescriptor) -> Result<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if self.fail_destination_check {
                return Err(GateError::BackendUnavailable("access denied".to_string()));
            }
            Ok(!self.destination_missing)
        }

        async fn upload(&self, descriptor: &ObjectDescriptor, payload: Bytes) -> Result<()> {
            if self.fail_upload {
                return Err(GateError::BackendUnavailable("put failed".to_string()));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((descriptor.clone(), payload));
            Ok(())
        }

        async fn notify(&self, topic: &str, descriptor: &ObjectDescriptor) -> Result<()> {
            if self.fail_notify {
                return Err(GateError::BackendUnavailable("publish failed".to_string()));
            }
            self.notifications
                .lock()
                .unwrap()
                .push((topic.to_string(), descriptor.clone()));
            Ok(())
        }
    }

    fn md5_header(data: &[u8]) -> Option<String> {
        Some(format!("md5={}", DigestAlgorithm::Md5.compute(data)))
    }

    fn request(body: &'static [u8], digest_header: Option<String>) -> IngestOperationRequest {
        IngestOperationRequest {
            identity: "log-1".to_string(),
            body: Bytes::from_static(body),
            digest_header,
        }
    }

    fn operation(backend: Arc<RecordingBackend>) -> IngestOperation {
        IngestOperation::new(backend, BackendParams::default())
    }

    #[tokio::test]
    async fn test_verified_transfer_is_uploaded_and_announced() {
        let backend = Arc::new(RecordingBackend::default());
        let outcome = operation(backend.clone())
            .run(request(b"hello", md5_header(b"hello")))
            .await
            .unwrap();

        let IngestOperationOutcome::Stored(descriptor) = &outcome else {
            panic!("expected stored outcome, got {:?}", outcome);
        };
        assert_eq!(descriptor.size_bytes, 5);
        assert_eq!(descriptor.destination, BackendParams::default().upload_bucket);
        assert_eq!(TransferResult::from(&outcome), TransferResult::success());

        let uploads = backend.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1.len(), 5);
        assert_eq!(&uploads[0].0, descriptor);

        let notifications = backend.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, BackendParams::default().topic);
        assert_eq!(&notifications[0].1, descriptor);
    }

    #[tokio::test]
    async fn test_corrupt_transfer_never_reaches_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let outcome = operation(backend.clone())
            .run(request(b"hello", md5_header(b"world")))
            .await
            .unwrap();

        assert!(matches!(outcome, IngestOperationOutcome::Corrupt { .. }));
        assert_eq!(TransferResult::from(&outcome), TransferResult::failure());
        assert_eq!(backend.configures.load(Ordering::SeqCst), 0);
        assert_eq!(backend.checks.load(Ordering::SeqCst), 0);
        assert_eq!(backend.upload_count(), 0);
        assert_eq!(backend.notify_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_transfer_never_reaches_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let op = operation(backend.clone());

        for header in [None, Some("md5".to_string()), Some("rot13=abc".to_string())] {
            let outcome = op.run(request(b"hello", header)).await.unwrap();
            assert!(matches!(outcome, IngestOperationOutcome::Malformed(_)));
        }
        assert_eq!(backend.upload_count(), 0);
        assert_eq!(backend.notify_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_destination_stops_before_upload() {
        let backend = Arc::new(RecordingBackend {
            destination_missing: true,
            ..RecordingBackend::default()
        });
        let result = operation(backend.clone())
            .run(request(b"hello", md5_header(b"hello")))
            .await;

        assert!(matches!(result, Err(GateError::DestinationMissing(_))));
        assert_eq!(backend.checks.load(Ordering::SeqCst), 1);
        assert_eq!(backend.upload_count(), 0);
        assert_eq!(backend.notify_count(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_destination_check_is_an_error() {
        let backend = Arc::new(RecordingBackend {
            fail_destination_check: true,
            ..RecordingBackend::default()
        });
        let result = operation(backend.clone())
            .run(request(b"hello", md5_header(b"hello")))
            .await;

        assert!(matches!(result, Err(GateError::BackendUnavailable(_))));
        assert_eq!(backend.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_skips_notify() {
        let backend = Arc::new(RecordingBackend {
            fail_upload: true,
            ..RecordingBackend::default()
        });
        let result = operation(backend.clone())
            .run(request(b"hello", md5_header(b"hello")))
            .await;

        assert!(matches!(result, Err(GateError::BackendUnavailable(_))));
        assert_eq!(backend.notify_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_notify_is_reported() {
        let backend = Arc::new(RecordingBackend {
            fail_notify: true,
            ..RecordingBackend::default()
        });
        let result = operation(backend.clone())
            .run(request(b"hello", md5_header(b"hello")))
            .await;

        assert!(matches!(result, Err(GateError::BackendUnavailable(_))));
        assert_eq!(backend.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_transfers_get_distinct_keys() {
        let backend: Arc<dyn StorageBackend> = Arc::new(DebugBackend::new());
        let op = IngestOperation::new(backend, BackendParams::default());

        let mut handles = Vec::new();
        for _ in 0..64 {
            let op = op.clone();
            handles.push(tokio::spawn(async move {
                op.run(request(b"hello", md5_header(b"hello"))).await
            }));
        }

        let mut keys = HashSet::new();
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                IngestOperationOutcome::Stored(descriptor) => {
                    keys.insert(descriptor.object_key);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(keys.len(), 64);
    }

    #[test]
    fn test_transfer_result_wire_format() {
        assert_eq!(
            serde_json::to_string(&TransferResult::success()).unwrap(),
            r#"{"status":"success"}"#
        );
        assert_eq!(
            serde_json::to_string(&TransferResult::failure()).unwrap(),
            r#"{"status":"failure"}"#
        );
    }
}
