//! Loggate Core - secure ingest path for logger uploads
//!
//! Loggers upload raw data files over HTTPS. The gateway:
//! - authenticates Basic credentials against Argon2 hashes in constant time
//! - recomputes the claimed payload digest before anything leaves the process
//! - stores accepted payloads under a fresh UUID key and announces them on a topic

pub mod auth;
pub mod backend;
pub mod credentials;
pub mod error;
pub mod integrity;
pub mod operations;

pub use auth::{AUTH_CHALLENGE, AuthDecision, Authenticator, parse_basic_credentials};
pub use backend::{
    BackendBuilder, BackendParams, BackendProvider, DebugBackend, NotificationParams,
    NotificationPublisher, OBJECT_KEY_SUFFIX, ObjectDescriptor, ObjectStoreBackend,
    StorageBackend,
};
pub use credentials::{
    CredentialStore, MemoryCredentialStore, SecretHasher, SqliteCredentialStore,
};
pub use error::{GateError, Result};
pub use integrity::{ClaimedDigest, DigestAlgorithm, TransferVerdict, verify_transfer};
pub use operations::{
    CheckinOperation, CheckinOperationRequest, CheckinStatus, IngestOperation,
    IngestOperationOutcome, IngestOperationRequest, TransferResult, TransferStatus,
};
