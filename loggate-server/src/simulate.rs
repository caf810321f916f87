//! Simulated logger uploads for exercising a running gateway.

use anyhow::{Context, bail};
use loggate_core::{DigestAlgorithm, TransferResult};
use rand::RngCore;
use std::path::PathBuf;

/// Where a simulated logger uploads to, and as whom.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub server: String,
    pub port: u16,
    pub logger: String,
    pub password: String,
    /// Extra root certificate (PEM) to trust, e.g. a self-signed CA.
    pub ca_cert: Option<PathBuf>,
    pub plain_http: bool,
}

impl UploadTarget {
    pub fn url(&self) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!("{}://{}:{}/update", scheme, self.server, self.port)
    }

    fn client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(path) = &self.ca_cert {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read CA certificate {:?}", path))?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("invalid CA certificate {:?}", path))?;
            builder = builder.add_root_certificate(certificate);
        }
        Ok(builder.build()?)
    }
}

pub fn generate_payload(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// `md5=<HEX>`, uppercase as loggers send it.
pub fn digest_header(payload: &[u8]) -> String {
    format!("md5={}", DigestAlgorithm::Md5.compute(payload).to_uppercase())
}

/// POST `payload` to `/update` the way a logger does and decode the verdict.
pub async fn simulate_upload(
    target: &UploadTarget,
    payload: Vec<u8>,
) -> anyhow::Result<TransferResult> {
    if target.logger.is_empty() || target.password.is_empty() {
        bail!("must specify logger name and password");
    }

    let url = target.url();
    let response = target
        .client()?
        .post(&url)
        .basic_auth(&target.logger, Some(&target.password))
        .header("Digest", digest_header(&payload))
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(payload)
        .send()
        .await
        .with_context(|| format!("failed to POST to {}", url))?;

    let status = response.status();
    let body = response.text().await?;
    tracing::debug!("response {} body = {:?}", status, body);

    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!("server rejected the credentials for logger {:?}", target.logger);
    }

    serde_json::from_str(&body)
        .with_context(|| format!("unexpected response from server ({}): {:?}", status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::server::{ServerState, build_router};
    use loggate_core::{
        Authenticator, BackendParams, CredentialStore, DebugBackend, IngestOperation,
        MemoryCredentialStore, TransferStatus,
    };
    use std::sync::Arc;

    async fn serve(backend: Arc<DebugBackend>) -> u16 {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert("log-1", "abc").await.unwrap();

        let authenticator = Authenticator::new(store).unwrap();
        let ingest = IngestOperation::new(backend, BackendParams::default());
        let state = Arc::new(ServerState::new(authenticator, ingest));
        let app = build_router(state, &ApiConfig::default());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    fn target(port: u16, password: &str) -> UploadTarget {
        UploadTarget {
            server: "127.0.0.1".to_string(),
            port,
            logger: "log-1".to_string(),
            password: password.to_string(),
            ca_cert: None,
            plain_http: true,
        }
    }

    #[tokio::test]
    async fn test_simulated_upload_is_stored() {
        let backend = Arc::new(DebugBackend::new());
        let port = serve(backend.clone()).await;

        let result = simulate_upload(&target(port, "abc"), generate_payload(4096))
            .await
            .unwrap();

        assert_eq!(result.status, TransferStatus::Success);
        assert_eq!(backend.upload_count(), 1);
        assert_eq!(backend.notification_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_upload_with_wrong_password() {
        let backend = Arc::new(DebugBackend::new());
        let port = serve(backend.clone()).await;

        let result = simulate_upload(&target(port, "wrong"), generate_payload(16)).await;

        assert!(result.is_err());
        assert_eq!(backend.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_sending() {
        let mut target = target(9, "abc");
        target.logger.clear();

        let error = simulate_upload(&target, generate_payload(16))
            .await
            .unwrap_err();
        assert!(error.to_string().contains("logger name and password"));
    }

    #[test]
    fn test_digest_header_is_uppercase_md5() {
        assert_eq!(
            digest_header(b"hello"),
            "md5=5D41402ABC4B2A76B9719D911017C592"
        );
    }

    #[test]
    fn test_payload_and_url() {
        assert_eq!(generate_payload(100).len(), 100);

        let mut target = target(8443, "abc");
        target.server = "gateway.local".to_string();
        assert_eq!(target.url(), "http://gateway.local:8443/update");
        target.plain_http = false;
        assert_eq!(target.url(), "https://gateway.local:8443/update");
    }
}
