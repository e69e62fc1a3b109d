use argon2::{Algorithm, Argon2, Params, Version};
use base64ct::{Base64Unpadded, Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::error;

/// Fixed salt for password hashing. Uniqueness comes from the pepper, which
/// keeps the hash deterministic so stored hashes can be compared directly.
const PASSWORD_SALT: &[u8] = b"accounts/password/v1";
const DIGEST_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("argon2: {0}")]
    Argon2(argon2::Error),
}

impl From<argon2::Error> for CodecError {
    fn from(e: argon2::Error) -> Self {
        error!(error = %e, "argon2 error");
        CodecError::Argon2(e)
    }
}

/// Password hashing and confirmation-code derivation.
#[derive(Clone)]
pub struct CredentialCodec {
    pepper: Vec<u8>,
    params: Params,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl CredentialCodec {
    pub fn new(pepper: impl Into<Vec<u8>>) -> Self {
        Self::with_params(pepper, Params::default())
    }

    pub fn with_params(pepper: impl Into<Vec<u8>>, params: Params) -> Self {
        Self {
            pepper: pepper.into(),
            params,
        }
    }

    fn argon2(&self) -> Result<Argon2<'_>, CodecError> {
        Ok(Argon2::new_with_secret(
            &self.pepper,
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )?)
    }

    /// Keyed one-way hash of `plain`. The same input always yields the same output.
    pub fn hash_password(&self, plain: &str) -> Result<String, CodecError> {
        let mut out = [0u8; DIGEST_LEN];
        self.argon2()?
            .hash_password_into(plain.as_bytes(), PASSWORD_SALT, &mut out)?;
        Ok(Base64Unpadded::encode_string(&out))
    }

    /// Compare `plain` against a stored hash.
    pub fn verify_password(&self, plain: &str, hash: &str) -> Result<bool, CodecError> {
        let candidate = self.hash_password(plain)?;
        Ok(constant_time_eq(candidate.as_bytes(), hash.as_bytes()))
    }

    /// Derive a confirmation code from the account fields and a nonce.
    pub fn derive_confirmation_code(
        &self,
        password_hash: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
        nonce: &[u8; NONCE_LEN],
    ) -> Result<String, CodecError> {
        // Unit separator keeps ("ab", "c") and ("a", "bc") apart.
        let material = [password_hash, email, first_name, last_name].join("\u{1f}");
        let mut out = [0u8; DIGEST_LEN];
        self.argon2()?
            .hash_password_into(material.as_bytes(), nonce, &mut out)?;
        Ok(Base64UrlUnpadded::encode_string(&out))
    }

    /// Confirmation code for an account entering the unconfirmed state.
    pub fn fresh_confirmation_code(
        &self,
        password_hash: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, CodecError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        self.derive_confirmation_code(password_hash, email, first_name, last_name, &nonce)
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
pub(crate) fn test_codec() -> CredentialCodec {
    let params = Params::new(Params::MIN_M_COST, 1, 1, Some(DIGEST_LEN)).expect("cheap params");
    CredentialCodec::with_params("test-pepper", params)
}
