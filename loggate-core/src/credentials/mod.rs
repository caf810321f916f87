//! Hashed logger credentials.
//!
//! Provides the Argon2 secret hasher and the credential stores the
//! authenticator reads from.

pub mod hasher;
pub mod store;

pub use hasher::{CredentialDigest, SecretHasher, digest_bytes};
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
