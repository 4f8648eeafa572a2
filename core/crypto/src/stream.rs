//! Streaming AES-256-GCM.
//!
//! The whole file is one GCM message: a single IV, one 128-bit tag over the
//! entire ciphertext, no associated data. Data is fed in arbitrarily sized
//! chunks so memory stays bounded by the caller's buffer. The construction is
//! CTR mode (32-bit big-endian counter starting at `IV || 2`) plus GHASH,
//! exactly as the one-shot `aes-gcm` AEAD computes it.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::Aes256;
use ghash::{universal_hash::UniversalHash, GHash};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::keys::{DerivedKey, Iv, IV_LENGTH};
use foldervault_common::{Error, Result};

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

const BLOCK_SIZE: usize = 16;

type Aes256Ctr = ctr::Ctr32BE<Aes256>;

/// Incremental GCM state shared by both directions.
struct GcmState {
    keystream: Aes256Ctr,
    ghash: GHash,
    /// Ciphertext bytes not yet forming a whole GHASH block.
    partial: [u8; BLOCK_SIZE],
    partial_len: usize,
    ciphertext_len: u64,
    /// `E(K, J0)`, XORed into the final GHASH value.
    tag_mask: [u8; BLOCK_SIZE],
}

impl GcmState {
    fn new(key: &DerivedKey, iv: &Iv) -> Self {
        let cipher = Aes256::new(GenericArray::from_slice(key.as_bytes()));

        let mut hash_key = ghash::Block::default();
        cipher.encrypt_block(&mut hash_key);
        let ghash = GHash::new(&hash_key);
        hash_key.as_mut_slice().zeroize();

        let mut j0 = [0u8; BLOCK_SIZE];
        j0[..IV_LENGTH].copy_from_slice(iv.as_bytes());
        j0[BLOCK_SIZE - 1] = 1;

        let mut mask_block = GenericArray::clone_from_slice(&j0);
        cipher.encrypt_block(&mut mask_block);
        let mut tag_mask = [0u8; BLOCK_SIZE];
        tag_mask.copy_from_slice(&mask_block);
        mask_block.as_mut_slice().zeroize();

        let mut counter = j0;
        counter[BLOCK_SIZE - 1] = 2;
        let keystream = Aes256Ctr::new(
            GenericArray::from_slice(key.as_bytes()),
            GenericArray::from_slice(&counter),
        );

        Self {
            keystream,
            ghash,
            partial: [0u8; BLOCK_SIZE],
            partial_len: 0,
            ciphertext_len: 0,
            tag_mask,
        }
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<()> {
        self.keystream
            .try_apply_keystream(buf)
            .map_err(|_| Error::InvalidInput("Stream exceeds the GCM length limit".to_string()))
    }

    /// Feed ciphertext into GHASH, carrying incomplete blocks between calls.
    fn absorb(&mut self, mut data: &[u8]) {
        self.ciphertext_len += data.len() as u64;

        if self.partial_len > 0 {
            let take = (BLOCK_SIZE - self.partial_len).min(data.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&data[..take]);
            self.partial_len += take;
            data = &data[take..];

            if self.partial_len < BLOCK_SIZE {
                return;
            }
            self.ghash
                .update(&[GenericArray::clone_from_slice(&self.partial)]);
            self.partial_len = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_SIZE);
        for block in &mut blocks {
            self.ghash.update(&[GenericArray::clone_from_slice(block)]);
        }

        let rest = blocks.remainder();
        self.partial[..rest.len()].copy_from_slice(rest);
        self.partial_len = rest.len();
    }

    fn tag(&mut self) -> [u8; TAG_SIZE] {
        let mut ghash = self.ghash.clone();
        if self.partial_len > 0 {
            ghash.update_padded(&self.partial[..self.partial_len]);
        }

        // No associated data: the length block is 0 || bitlen(ciphertext).
        let mut lengths = [0u8; BLOCK_SIZE];
        lengths[8..].copy_from_slice(&(self.ciphertext_len * 8).to_be_bytes());
        ghash.update(&[GenericArray::clone_from_slice(&lengths)]);

        let digest = ghash.finalize();
        let mut tag = [0u8; TAG_SIZE];
        for (out, (d, m)) in tag.iter_mut().zip(digest.iter().zip(self.tag_mask.iter())) {
            *out = d ^ m;
        }
        tag
    }
}

impl Drop for GcmState {
    fn drop(&mut self) {
        self.partial.zeroize();
        self.tag_mask.zeroize();
    }
}

/// Encrypting half of a streaming GCM message.
pub struct EncryptingStream {
    state: GcmState,
}

impl EncryptingStream {
    /// Start a new message under `key` and `iv`.
    ///
    /// # Security
    /// - The IV must never be reused with the same key
    pub fn new(key: &DerivedKey, iv: &Iv) -> Self {
        Self {
            state: GcmState::new(key, iv),
        }
    }

    /// Encrypt `buf` in place.
    pub fn update(&mut self, buf: &mut [u8]) -> Result<()> {
        self.state.apply_keystream(buf)?;
        self.state.absorb(buf);
        Ok(())
    }

    /// Finish the message and return the authentication tag.
    pub fn finalize(mut self) -> [u8; TAG_SIZE] {
        self.state.tag()
    }
}

/// Decrypting half of a streaming GCM message.
///
/// Plaintext produced by [`update`](Self::update) is unauthenticated until
/// [`verify`](Self::verify) succeeds; callers must stage it somewhere they can
/// discard.
pub struct DecryptingStream {
    state: GcmState,
}

impl DecryptingStream {
    /// Start decrypting a message under `key` and `iv`.
    pub fn new(key: &DerivedKey, iv: &Iv) -> Self {
        Self {
            state: GcmState::new(key, iv),
        }
    }

    /// Decrypt `buf` in place.
    pub fn update(&mut self, buf: &mut [u8]) -> Result<()> {
        self.state.absorb(buf);
        self.state.apply_keystream(buf)
    }

    /// Check the expected tag in constant time.
    ///
    /// # Errors
    /// - `AuthenticationFailed` on mismatch
    pub fn verify(mut self, expected: &[u8; TAG_SIZE]) -> Result<()> {
        let tag = self.state.tag();
        if bool::from(tag[..].ct_eq(&expected[..])) {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed)
        }
    }
}

/// Encrypt a complete byte slice, returning `ciphertext || tag`.
///
/// This is a convenience function for when the complete data is available.
pub fn encrypt_bytes(key: &DerivedKey, iv: &Iv, data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len() + TAG_SIZE);
    output.extend_from_slice(data);

    let mut stream = EncryptingStream::new(key, iv);
    stream.update(&mut output)?;
    output.extend_from_slice(&stream.finalize());
    Ok(output)
}

/// Decrypt `ciphertext || tag` produced by [`encrypt_bytes`].
///
/// No plaintext is returned unless the tag verifies.
pub fn decrypt_bytes(key: &DerivedKey, iv: &Iv, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailed);
    }
    let (ciphertext, tag_bytes) = data.split_at(data.len() - TAG_SIZE);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(tag_bytes);

    let mut output = ciphertext.to_vec();
    let mut stream = DecryptingStream::new(key, iv);
    stream.update(&mut output)?;

    if let Err(e) = stream.verify(&tag) {
        output.zeroize();
        return Err(e);
    }
    Ok(output)
}
