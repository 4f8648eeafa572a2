//! Key derivation using scrypt.
//!
//! scrypt is a memory-hard password hashing function. The cost parameters are
//! fixed because the container format does not record them.

use scrypt::{scrypt, Params};

use crate::keys::{DerivedKey, Salt, KEY_LENGTH};
use foldervault_common::{Error, Result};

/// log2 of the CPU/memory cost factor (N = 16384).
pub const SCRYPT_LOG_N: u8 = 14;

/// Block size parameter.
pub const SCRYPT_R: u32 = 8;

/// Parallelism parameter.
pub const SCRYPT_P: u32 = 1;

/// Derive a file key from a password and the file's salt.
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
/// - The key zeroizes itself when dropped
///
/// # Errors
/// - `KeyDerivationFailed` if scrypt rejects its parameters
///
/// # Security
/// - CPU and memory bound; call from a blocking context
/// - Password is not stored or logged
pub fn derive_key(password: &[u8], salt: &Salt) -> Result<DerivedKey> {
    derive_into(password, salt.as_bytes())
}

fn derive_into(password: &[u8], salt: &[u8]) -> Result<DerivedKey> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LENGTH)
        .map_err(|e| Error::KeyDerivationFailed(format!("Invalid scrypt parameters: {}", e)))?;

    let mut key = DerivedKey::zeroed();
    scrypt(password, salt, &params, key.as_mut_bytes())
        .map_err(|e| Error::KeyDerivationFailed(e.to_string()))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7914_vector_prefix() {
        // RFC 7914 §12, N=16384 r=8 p=1; PBKDF2 output blocks are independent,
        // so the 32-byte key is the first half of the published 64-byte output.
        let key = derive_into(b"pleaseletmein", b"SodiumChloride").unwrap();
        let expected: [u8; 32] = [
            0x70, 0x23, 0xbd, 0xcb, 0x3a, 0xfd, 0x73, 0x48, 0x46, 0x1c, 0x06, 0xcd, 0x81, 0xfd,
            0x38, 0xeb, 0xfd, 0xa8, 0xfb, 0xba, 0x90, 0x4f, 0x8e, 0x3e, 0xa9, 0xb5, 0x43, 0xf6,
            0x54, 0x5d, 0xa1, 0xf2,
        ];
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(b"test-password-123", &salt).unwrap();
        let key2 = derive_key(b"test-password-123", &salt).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let key1 = derive_key(b"test-password-123", &Salt::from_bytes([1u8; 16])).unwrap();
        let key2 = derive_key(b"test-password-123", &Salt::from_bytes([2u8; 16])).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(b"password1", &salt).unwrap();
        let key2 = derive_key(b"password2", &salt).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }
}
