//! Sealing
//!
//! Authenticated encryption for everything that leaves the process: the
//! proof file, history entries, and remote records. Uses:
//! - Argon2id for password-based key derivation
//! - ChaCha20-Poly1305 for authenticated encryption
//!
//! Sealed values are text of the form `nonce_hex:ciphertext_hex`.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::Rng;
use zeroize::Zeroizing;

use crate::error::SealError;

/// Argon2 parameters (tuned for security vs. usability)
const ARGON2_MEMORY_KB: u32 = 65536; // 64 MB
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

const NONCE_LEN: usize = 12;

/// A 32-byte symmetric key, wiped on drop
#[derive(Clone)]
pub struct SealingKey {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(..)")
    }
}

impl SealingKey {
    /// Use raw key material (e.g. derived from the owner's identity key)
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(bytes),
        }
    }

    /// Fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Derive a key from a password and a base64 salt using Argon2id
    pub fn derive(password: &str, salt: &str) -> Result<Self, SealError> {
        let salt = SaltString::from_b64(salt)
            .map_err(|_| SealError::KeyDerivation("invalid salt format".to_string()))?;

        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2::Params::new(
                ARGON2_MEMORY_KB,
                ARGON2_ITERATIONS,
                ARGON2_PARALLELISM,
                Some(32),
            )
            .map_err(|_| SealError::KeyDerivation("invalid Argon2 parameters".to_string()))?,
        );

        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| SealError::KeyDerivation(e.to_string()))?;

        let hash_output = hash
            .hash
            .ok_or_else(|| SealError::KeyDerivation("no hash output".to_string()))?;
        let hash_bytes = hash_output.as_bytes();
        if hash_bytes.len() < 32 {
            return Err(SealError::KeyDerivation("short hash output".to_string()));
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&hash_bytes[..32]);
        Ok(Self { key })
    }

    /// Encrypt `plaintext` under a fresh random nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, SealError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce_bytes);

        let cipher = self.cipher()?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| SealError::Encrypt)?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a value produced by [`SealingKey::seal`]
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, SealError> {
        let (nonce_hex, ciphertext_hex) = sealed
            .split_once(':')
            .ok_or_else(|| SealError::Malformed("expected nonce:ciphertext".to_string()))?;

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|_| SealError::Malformed("invalid nonce format".to_string()))?;
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|_| SealError::Malformed("invalid ciphertext format".to_string()))?;

        if nonce_bytes.len() != NONCE_LEN {
            return Err(SealError::Malformed("invalid nonce length".to_string()));
        }

        let cipher = self.cipher()?;
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| SealError::Decrypt)
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, SealError> {
        ChaCha20Poly1305::new_from_slice(self.key.as_ref())
            .map_err(|_| SealError::KeyDerivation("failed to create cipher".to_string()))
    }
}

/// Random salt suitable for [`SealingKey::derive`]
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = SealingKey::generate();
        let sealed = key.seal(b"proofs").unwrap();
        assert!(sealed.contains(':'));
        assert_eq!(key.open(&sealed).unwrap(), b"proofs");
    }

    #[test]
    fn test_wrong_key() {
        let sealed = SealingKey::generate().seal(b"proofs").unwrap();
        let result = SealingKey::generate().open(&sealed);
        assert_eq!(result, Err(SealError::Decrypt));
    }

    #[test]
    fn test_malformed() {
        let key = SealingKey::generate();
        assert!(matches!(key.open("no-separator"), Err(SealError::Malformed(_))));
        assert!(matches!(key.open("zz:00"), Err(SealError::Malformed(_))));
        assert!(matches!(key.open("0011:00"), Err(SealError::Malformed(_))));
    }

    #[test]
    fn test_derive_is_deterministic_per_salt() {
        let salt = generate_salt();
        let a = SealingKey::derive("test-password-123", &salt).unwrap();
        let b = SealingKey::derive("test-password-123", &salt).unwrap();

        let sealed = a.seal(b"x").unwrap();
        assert_eq!(b.open(&sealed).unwrap(), b"x");

        let other = SealingKey::derive("wrong-password", &salt).unwrap();
        assert!(other.open(&sealed).is_err());
    }
}
