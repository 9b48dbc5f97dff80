//! Password managers used by principal folders to store and verify passwords.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{AuthError, Result};

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub trait PasswordManager: Send + Sync {
    fn name(&self) -> &str;

    fn encode_password(&self, password: &str) -> Result<String>;

    /// Compare a candidate password to a value produced by `encode_password`.
    fn check_password(&self, encoded: &str, password: &str) -> Result<bool>;
}

/// Stores passwords as given
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextPasswordManager;

impl PasswordManager for PlainTextPasswordManager {
    fn name(&self) -> &str {
        "plain"
    }

    fn encode_password(&self, password: &str) -> Result<String> {
        Ok(password.to_string())
    }

    fn check_password(&self, encoded: &str, password: &str) -> Result<bool> {
        Ok(constant_time_eq(encoded, password))
    }
}

const SHA256_SCHEME: &str = "{SHA256}";

/// Salted SHA-256, encoded as `{SHA256}<salt hex>$<digest hex>`.
///
/// A bare 64-character hex digest is also accepted as an unsalted hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256PasswordManager;

impl Sha256PasswordManager {
    fn digest(salt: &[u8], password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl PasswordManager for Sha256PasswordManager {
    fn name(&self) -> &str {
        "sha256"
    }

    fn encode_password(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; 8];
        OsRng.fill_bytes(&mut salt);
        Ok(format!(
            "{}{}${}",
            SHA256_SCHEME,
            hex::encode(salt),
            Self::digest(&salt, password)
        ))
    }

    fn check_password(&self, encoded: &str, password: &str) -> Result<bool> {
        let Some(body) = encoded.strip_prefix(SHA256_SCHEME) else {
            return Ok(constant_time_eq(&Self::digest(&[], password), &encoded.to_ascii_lowercase()));
        };

        let (salt_hex, digest) = body
            .split_once('$')
            .ok_or_else(|| AuthError::password("Malformed SHA256 password hash"))?;
        let salt = hex::decode(salt_hex).map_err(|e| AuthError::password(format!("Invalid salt: {}", e)))?;

        Ok(constant_time_eq(&Self::digest(&salt, password), &digest.to_ascii_lowercase()))
    }
}

/// Argon2id in PHC string format
pub struct Argon2PasswordManager {
    argon2: Argon2<'static>,
}

impl Argon2PasswordManager {
    /// `memory_cost` is in KiB
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_cost, time_cost, parallelism, None)
            .map_err(|e| AuthError::password(format!("Invalid Argon2 params: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2PasswordManager {
    fn default() -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default()),
        }
    }
}

impl PasswordManager for Argon2PasswordManager {
    fn name(&self) -> &str {
        "argon2"
    }

    fn encode_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::password(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    fn check_password(&self, encoded: &str, password: &str) -> Result<bool> {
        let parsed = PasswordHash::new(encoded)
            .map_err(|e| AuthError::password(format!("Invalid password hash format: {}", e)))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => {
                debug!("Argon2 password mismatch");
                Ok(false)
            }
            Err(e) => Err(AuthError::password(format!("Password verification error: {}", e))),
        }
    }
}

/// Look up a password manager by its configured name
pub fn password_manager(name: &str) -> Result<Arc<dyn PasswordManager>> {
    match name {
        "plain" => Ok(Arc::new(PlainTextPasswordManager)),
        "sha256" => Ok(Arc::new(Sha256PasswordManager)),
        "argon2" => Ok(Arc::new(Argon2PasswordManager::default())),
        other => Err(AuthError::config(format!("Unknown password manager: {}", other))),
    }
}
