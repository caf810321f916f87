//! Secret hashing for logger credentials.
//!
//! Secrets are stored as Argon2 PHC strings. The authenticator never compares
//! PHC strings directly: it re-hashes the claimed secret with the stored salt
//! and parameters and compares fixed-length SHA-256 digests of both outputs.

use crate::{GateError, Result};
use argon2::{
    Argon2, Params,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use subtle::{Choice, ConstantTimeEq};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Secret behind the dummy hash checked for unknown identities.
pub(crate) const UNREGISTERED_SECRET: &str = "loggate-unregistered-logger";

/// Fixed-length digest used for constant-time comparisons.
pub type CredentialDigest = [u8; 32];

/// Clones share the dummy hash.
#[derive(Clone, Default)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
    unregistered: Arc<OnceLock<String>>,
    #[cfg(test)]
    digest_calls: Arc<AtomicUsize>,
}

impl SecretHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a plaintext secret with a fresh random salt.
    pub fn hash_secret(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|_| GateError::HashingFailed)?;
        Ok(hash.to_string())
    }

    /// Returns `Ok(false)` on mismatch; `Err(InvalidHash)` only when the stored
    /// value is not a PHC string.
    pub fn verify_secret(&self, secret: &str, phc: &str) -> Result<bool> {
        let parsed = PasswordHash::new(phc).map_err(|_| GateError::InvalidHash)?;
        Ok(self
            .argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok())
    }

    /// Digests of the claimed secret's hash and of the stored hash, in that order.
    ///
    /// The claimed secret is hashed with the salt, algorithm and cost parameters
    /// taken from `phc`, so both digests are equal exactly when the secret is
    /// correct. The cost is the same whether or not it is.
    pub fn secret_digests(
        &self,
        secret: &str,
        phc: &str,
    ) -> Result<(CredentialDigest, CredentialDigest)> {
        #[cfg(test)]
        self.digest_calls.fetch_add(1, Ordering::SeqCst);

        let stored = PasswordHash::new(phc).map_err(|_| GateError::InvalidHash)?;
        let salt = stored.salt.ok_or(GateError::InvalidHash)?;
        let expected = stored.hash.ok_or(GateError::InvalidHash)?;
        let params = Params::try_from(&stored).map_err(|_| GateError::InvalidHash)?;

        let recomputed = self
            .argon2
            .hash_password_customized(
                secret.as_bytes(),
                Some(stored.algorithm),
                stored.version,
                params,
                salt,
            )
            .map_err(|_| GateError::HashingFailed)?;
        let provided = recomputed.hash.ok_or(GateError::HashingFailed)?;

        Ok((
            digest_bytes(provided.as_bytes()),
            digest_bytes(expected.as_bytes()),
        ))
    }

    /// Check `secret` against `stored`, or against the dummy hash when there
    /// is no record. A missing record never matches but costs the same.
    pub fn matches_stored(&self, secret: &str, stored: Option<&str>) -> Result<bool> {
        let registered = Choice::from(stored.is_some() as u8);
        let phc = match stored {
            Some(phc) => phc,
            None => self.unregistered_hash()?,
        };

        let (provided, expected) = self.secret_digests(secret, phc)?;
        Ok(bool::from(provided[..].ct_eq(&expected[..]) & registered))
    }

    /// PHC hash of `UNREGISTERED_SECRET`, computed on first use.
    pub fn unregistered_hash(&self) -> Result<&str> {
        if let Some(hash) = self.unregistered.get() {
            return Ok(hash.as_str());
        }
        let hash = self.hash_secret(UNREGISTERED_SECRET)?;
        Ok(self.unregistered.get_or_init(|| hash).as_str())
    }

    #[cfg(test)]
    pub(crate) fn digest_calls(&self) -> usize {
        self.digest_calls.load(Ordering::SeqCst)
    }
}

pub fn digest_bytes(data: &[u8]) -> CredentialDigest {
    Sha256::digest(data).into()
}
