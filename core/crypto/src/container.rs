//! On-disk container format.
//!
//! ```text
//! MAGIC (8) || SALT (16) || IV (12) || CIPHERTEXT (N) || TAG (16)
//! ```
//!
//! The authentication tag is always the final 16 bytes; the ciphertext is
//! everything between the header and the tag.

use crate::keys::{Iv, Salt, IV_LENGTH, SALT_LENGTH};
use crate::stream::TAG_SIZE;
use foldervault_common::{Error, Result};

/// Fixed ASCII tag opening every container.
pub const MAGIC: [u8; 8] = *b"FLDRVLT1";

/// Header size: magic + salt + IV.
pub const HEADER_LEN: usize = MAGIC.len() + SALT_LENGTH + IV_LENGTH;

/// Smallest valid container: header and tag around an empty ciphertext.
pub const MIN_CONTAINER_LEN: u64 = (HEADER_LEN + TAG_SIZE) as u64;

/// Parsed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub salt: Salt,
    pub iv: Iv,
}

impl ContainerHeader {
    /// Serialize to `magic || salt || iv`.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        encode_header(&self.salt, &self.iv)
    }

    /// Parse a header whose container length has already been validated.
    ///
    /// # Errors
    /// - `InvalidMagic` if the leading 8 bytes mismatch
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(Error::InvalidMagic);
        }

        let (salt_bytes, iv_bytes) = rest.split_at(SALT_LENGTH);
        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(salt_bytes);
        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(iv_bytes);

        Ok(Self {
            salt: Salt::from_bytes(salt),
            iv: Iv::from_bytes(iv),
        })
    }
}

/// Emit `magic || salt || iv`.
pub fn encode_header(salt: &Salt, iv: &Iv) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..MAGIC.len()].copy_from_slice(&MAGIC);
    out[MAGIC.len()..MAGIC.len() + SALT_LENGTH].copy_from_slice(salt.as_bytes());
    out[MAGIC.len() + SALT_LENGTH..].copy_from_slice(iv.as_bytes());
    out
}

/// Decode the header of a whole container (or any prefix of at least
/// [`MIN_CONTAINER_LEN`] bytes).
///
/// # Errors
/// - `TruncatedFile` if the input is shorter than header plus tag
/// - `InvalidMagic` if the leading 8 bytes mismatch
pub fn decode_header(bytes: &[u8]) -> Result<ContainerHeader> {
    ContainerLayout::for_len(bytes.len() as u64)?;

    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    ContainerHeader::parse(&header)
}

/// Byte offsets of the regions inside a container of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayout {
    total_len: u64,
}

impl ContainerLayout {
    /// Validate a container length.
    ///
    /// # Errors
    /// - `TruncatedFile` if `total_len` cannot hold a header and a tag
    pub fn for_len(total_len: u64) -> Result<Self> {
        if total_len < MIN_CONTAINER_LEN {
            return Err(Error::TruncatedFile {
                len: total_len,
                min: MIN_CONTAINER_LEN,
            });
        }
        Ok(Self { total_len })
    }

    /// Offset of the first ciphertext byte.
    pub fn ciphertext_offset(&self) -> u64 {
        HEADER_LEN as u64
    }

    /// Number of ciphertext bytes.
    pub fn ciphertext_len(&self) -> u64 {
        self.total_len - MIN_CONTAINER_LEN
    }

    /// Offset of the trailing tag.
    pub fn tag_offset(&self) -> u64 {
        self.total_len - TAG_SIZE as u64
    }

    /// Total container length.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }
}

/// Split an in-memory container into header, ciphertext and tag.
pub fn split_container(bytes: &[u8]) -> Result<(ContainerHeader, &[u8], [u8; TAG_SIZE])> {
    let header = decode_header(bytes)?;
    let (body, tag_bytes) = bytes.split_at(bytes.len() - TAG_SIZE);

    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(tag_bytes);

    Ok((header, &body[HEADER_LEN..], tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ContainerHeader {
        ContainerHeader {
            salt: Salt::from_bytes([0x11; SALT_LENGTH]),
            iv: Iv::from_bytes([0x22; IV_LENGTH]),
        }
    }

    #[test]
    fn test_header_layout() {
        let encoded = sample_header().encode();

        assert_eq!(encoded.len(), 36);
        assert_eq!(&encoded[..8], b"FLDRVLT1");
        assert_eq!(&encoded[8..24], &[0x11; 16]);
        assert_eq!(&encoded[24..36], &[0x22; 12]);
    }

    #[test]
    fn test_decode_header() {
        let mut container = sample_header().encode().to_vec();
        container.extend_from_slice(&[0u8; TAG_SIZE]);

        assert_eq!(decode_header(&container).unwrap(), sample_header());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut container = sample_header().encode().to_vec();
        container.extend_from_slice(&[0u8; TAG_SIZE]);
        container[0] ^= 0x01;

        assert!(matches!(decode_header(&container), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_truncated_before_magic_check() {
        // Garbage that is also too short reports truncation, not bad magic.
        let short = vec![0xFFu8; HEADER_LEN + TAG_SIZE - 1];
        assert!(matches!(
            decode_header(&short),
            Err(Error::TruncatedFile { len: 51, min: 52 })
        ));
        assert!(matches!(decode_header(&[]), Err(Error::TruncatedFile { .. })));
    }

    #[test]
    fn test_layout_offsets() {
        let layout = ContainerLayout::for_len(100).unwrap();
        assert_eq!(layout.ciphertext_offset(), 36);
        assert_eq!(layout.ciphertext_len(), 48);
        assert_eq!(layout.tag_offset(), 84);

        let empty = ContainerLayout::for_len(MIN_CONTAINER_LEN).unwrap();
        assert_eq!(empty.ciphertext_len(), 0);
    }

    #[test]
    fn test_split_container() {
        let mut container = sample_header().encode().to_vec();
        container.extend_from_slice(b"cipher");
        container.extend_from_slice(&[0x33; TAG_SIZE]);

        let (header, ciphertext, tag) = split_container(&container).unwrap();
        assert_eq!(header, sample_header());
        assert_eq!(ciphertext, b"cipher");
        assert_eq!(tag, [0x33; TAG_SIZE]);
    }
}
