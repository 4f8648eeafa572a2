//! Cryptographic primitives for FolderVault.
//!
//! This module provides:
//! - Key derivation using scrypt (N=16384, r=8, p=1)
//! - Streaming AES-256-GCM over arbitrarily large files
//! - The on-disk container codec
//! - Key types that zeroize on drop
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Authentication tags are compared in constant time

pub mod container;
pub mod kdf;
pub mod keys;
pub mod stream;

pub use container::{
    decode_header, encode_header, ContainerHeader, ContainerLayout, HEADER_LEN, MAGIC,
    MIN_CONTAINER_LEN,
};
pub use kdf::derive_key;
pub use keys::{DerivedKey, Iv, Salt, IV_LENGTH, KEY_LENGTH, SALT_LENGTH};
pub use stream::{DecryptingStream, EncryptingStream, TAG_SIZE};
