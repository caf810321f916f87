use super::SecretHasher;
use crate::{GateError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// One hashed secret per logger identity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored PHC hash for `identity`, or `None` when the logger is unknown.
    async fn lookup(&self, identity: &str) -> Result<Option<String>>;

    /// Hash `secret` and persist it. Fails with `AlreadyExists` when the
    /// identity already has a record.
    async fn insert(&self, identity: &str, secret: &str) -> Result<()>;

    fn hasher(&self) -> &SecretHasher;

    /// `true` only for a known identity with the matching secret. Unknown
    /// identities, wrong secrets and storage faults all read as `false`, and
    /// an unknown identity is hashed against a dummy record at the same cost.
    async fn verify(&self, identity: &str, secret: &str) -> bool {
        let stored = match self.lookup(identity).await {
            Ok(stored) => stored,
            Err(error) => {
                tracing::warn!("credential lookup failed during verify: {}", error);
                None
            }
        };

        let hasher = self.hasher().clone();
        let secret = secret.to_string();
        match tokio::task::spawn_blocking(move || hasher.matches_stored(&secret, stored.as_deref()))
            .await
        {
            Ok(Ok(matched)) => matched,
            Ok(Err(error)) => {
                tracing::error!("stored credential could not be checked: {}", error);
                false
            }
            Err(error) => {
                tracing::error!("credential verification task failed: {}", error);
                false
            }
        }
    }
}

/// SQLite-backed credential table, `loggers(name, hash)`.
///
/// The hash column holds the PHC string base64-encoded. A connection is opened
/// per call and every query runs on the blocking pool.
pub struct SqliteCredentialStore {
    db_path: PathBuf,
    hasher: SecretHasher,
}

impl SqliteCredentialStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
            hasher: SecretHasher::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = open_conn(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS loggers (
                name TEXT NOT NULL PRIMARY KEY,
                hash TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

fn open_conn(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    Ok(conn)
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn lookup(&self, identity: &str) -> Result<Option<String>> {
        let db_path = self.db_path.clone();
        let identity = identity.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = open_conn(&db_path)?;
            let encoded: Option<String> = conn
                .query_row(
                    "SELECT hash FROM loggers WHERE name = ?1",
                    [&identity],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(encoded) = encoded else {
                tracing::debug!("logger {} not found in credential store", identity);
                return Ok(None);
            };

            let decoded = BASE64_STANDARD
                .decode(encoded.as_bytes())
                .map_err(|_| GateError::InvalidHash)?;
            let phc = String::from_utf8(decoded).map_err(|_| GateError::InvalidHash)?;
            Ok(Some(phc))
        })
        .await?
    }

    async fn insert(&self, identity: &str, secret: &str) -> Result<()> {
        let db_path = self.db_path.clone();
        let hasher = self.hasher.clone();
        let identity = identity.to_string();
        let secret = secret.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let encoded = BASE64_STANDARD.encode(hasher.hash_secret(&secret)?);
            let conn = open_conn(&db_path)?;

            match conn.execute(
                "INSERT INTO loggers (name, hash) VALUES (?1, ?2)",
                params![identity, encoded],
            ) {
                Ok(_) => {
                    tracing::info!("inserted credentials for logger {}", identity);
                    Ok(())
                }
                Err(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.code == ErrorCode::ConstraintViolation =>
                {
                    Err(GateError::AlreadyExists(identity))
                }
                Err(error) => Err(error.into()),
            }
        })
        .await?
    }

    fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }
}

/// In-process credential table for tests and embedding.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, String>>,
    hasher: SecretHasher,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(&self, identity: &str) -> Result<Option<String>> {
        let records = self
            .records
            .read()
            .map_err(|_| GateError::Internal("credential table lock poisoned".to_string()))?;
        Ok(records.get(identity).cloned())
    }

    async fn insert(&self, identity: &str, secret: &str) -> Result<()> {
        let hasher = self.hasher.clone();
        let secret = secret.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash_secret(&secret)).await??;

        let mut records = self
            .records
            .write()
            .map_err(|_| GateError::Internal("credential table lock poisoned".to_string()))?;
        if records.contains_key(identity) {
            return Err(GateError::AlreadyExists(identity.to_string()));
        }
        records.insert(identity.to_string(), hash);
        Ok(())
    }

    fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }
}
