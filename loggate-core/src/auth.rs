//! Basic-credential authentication of loggers.
//!
//! Every request pays the same cost whether or not the claimed identity is
//! registered: one SHA-256 of the identity, one Argon2 hash of the claimed
//! secret (against a dummy hash for unknown loggers), and two constant-time
//! digest comparisons.

use crate::credentials::hasher::UNREGISTERED_SECRET;
use crate::credentials::{CredentialDigest, CredentialStore, SecretHasher, digest_bytes};
use crate::{GateError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use std::sync::Arc;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

/// Identity substituted for unregistered loggers. Its digest never equals
/// the digest of a claimed identity that has a record.
const UNREGISTERED_IDENTITY: &str = "invalid";

pub const AUTH_CHALLENGE: &str = r#"Basic realm="restricted", charset="UTF-8""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Approved(String),
    Denied,
}

impl AuthDecision {
    pub fn into_result(self) -> Result<String> {
        match self {
            AuthDecision::Approved(identity) => Ok(identity),
            AuthDecision::Denied => Err(GateError::AuthenticationDenied),
        }
    }
}

/// Split a `Basic base64(identity:secret)` header value.
///
/// The secret may itself contain `:`; only the first one separates.
pub fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (identity, secret) = decoded.split_once(':')?;
    Some((identity.to_string(), secret.to_string()))
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hasher: SecretHasher,
    unregistered_digest: CredentialDigest,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Result<Self> {
        let hasher = store.hasher().clone();
        hasher.unregistered_hash()?;

        Ok(Self {
            store,
            hasher,
            unregistered_digest: digest_bytes(UNREGISTERED_IDENTITY.as_bytes()),
        })
    }

    pub async fn authenticate(&self, authorization: Option<&str>) -> AuthDecision {
        let Some((identity, secret)) = authorization.and_then(parse_basic_credentials) else {
            tracing::debug!("request without usable basic credentials");
            return AuthDecision::Denied;
        };

        let stored = match self.store.lookup(&identity).await {
            Ok(stored) => stored,
            Err(error) => {
                tracing::warn!("credential lookup failed: {}", error);
                None
            }
        };
        let hasher = self.hasher.clone();
        let unregistered_digest = self.unregistered_digest;
        let claimed_identity = identity.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            credentials_match(
                &hasher,
                &claimed_identity,
                &secret,
                stored.as_deref(),
                &unregistered_digest,
            )
        })
        .await;

        match outcome {
            Ok(Ok(true)) => {
                tracing::debug!("logger {:?} authenticated", identity);
                AuthDecision::Approved(identity)
            }
            Ok(Ok(false)) => {
                tracing::info!("authentication denied for claimed logger {:?}", identity);
                AuthDecision::Denied
            }
            Ok(Err(error)) => {
                tracing::error!("credential check for {:?} failed: {}", identity, error);
                AuthDecision::Denied
            }
            Err(error) => {
                tracing::error!("credential check task failed: {}", error);
                AuthDecision::Denied
            }
        }
    }
}

fn credentials_match(
    hasher: &SecretHasher,
    identity: &str,
    secret: &str,
    stored: Option<&str>,
    unregistered_digest: &CredentialDigest,
) -> Result<bool> {
    let registered = Choice::from(stored.is_some() as u8);
    let stored_hash = match stored {
        Some(phc) => phc,
        None => hasher.unregistered_hash()?,
    };
    let provided_id = digest_bytes(identity.as_bytes());

    let mut expected_id = [0u8; 32];
    for (index, byte) in expected_id.iter_mut().enumerate() {
        *byte = u8::conditional_select(
            &unregistered_digest[index],
            &provided_id[index],
            registered,
        );
    }

    let (provided_secret, expected_secret) = hasher.secret_digests(secret, stored_hash)?;

    let id_match = provided_id[..].ct_eq(&expected_id[..]);
    let secret_match = provided_secret[..].ct_eq(&expected_secret[..]);
    // A claimed identity of "invalid" matches the sentinel digest.
    Ok(bool::from(id_match & secret_match & registered))
}
