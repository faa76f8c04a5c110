//! Credential hashing for accounts

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Argon2id memory cost in KiB.
pub const ARGON2_MEMORY_KIB: u32 = 19_456;
/// Argon2id iteration count.
pub const ARGON2_ITERATIONS: u32 = 2;
/// Argon2id lanes.
pub const ARGON2_PARALLELISM: u32 = 1;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(argon2::Error),
    #[error("password hashing failed: {0}")]
    HashFailed(password_hash::Error),
    #[error("stored credential hash is malformed: {0}")]
    MalformedHash(password_hash::Error),
    #[error("hashing task did not complete: {0}")]
    Interrupted(String),
}

/// One-way password hashing primitive.
///
/// `verify` is what a login flow would call against a stored
/// `credential_hash`; registration only ever calls `hash`.
pub trait CredentialHasher: Send + Sync {
    /// Produce a salted, self-describing hash of `password`.
    fn hash(&self, password: &SecretString) -> Result<String, AuthError>;

    /// Check `password` against a hash produced by [`CredentialHasher::hash`].
    ///
    /// A mismatch is `Ok(false)`; `Err` is reserved for hashes that cannot be
    /// parsed or evaluated.
    fn verify(&self, password: &SecretString, credential_hash: &str) -> Result<bool, AuthError>;
}

/// Argon2id hasher with a fixed work factor.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Hasher with the production work factor
    /// (`m=19456 KiB, t=2, p=1`, Argon2id v0x13).
    pub fn new() -> Result<Self, AuthError> {
        Self::with_cost(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM)
    }

    /// Hasher with an explicit work factor. Only tests should go below the
    /// production cost.
    pub fn with_cost(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(AuthError::InvalidParams)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &SecretString) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let credential_hash = self
            .argon2
            .hash_password(password.expose_secret().as_bytes(), &salt)
            .map_err(AuthError::HashFailed)?
            .to_string();

        Ok(credential_hash)
    }

    fn verify(&self, password: &SecretString, credential_hash: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(credential_hash).map_err(AuthError::MalformedHash)?;

        // Parameters are taken from the PHC string, not from `self`, so hashes
        // written under an older work factor still verify.
        match self
            .argon2
            .verify_password(password.expose_secret().as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::HashFailed(e)),
        }
    }
}
