//! Datagram framing.
//!
//! Everything after the 8-byte sequence header is AEAD-protected:
//! ```text
//! [ sequence number (8, BE) | ciphertext .. | Poly1305 tag (16) ]
//! ```
//! The header is the associated data of the AEAD pass, so a datagram
//! whose sequence number was rewritten fails authentication.

use crate::core::{AEAD_TAG_SIZE, MessageError, SEQ_HEADER_SIZE};

/// One UDP datagram on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Per-direction sequence number from the cleartext header.
    pub seq: u64,
    /// Ciphertext plus authentication tag.
    pub body: Vec<u8>,
}

impl Datagram {
    /// Smallest datagram that can possibly authenticate.
    pub const MIN_SIZE: usize = SEQ_HEADER_SIZE + AEAD_TAG_SIZE;

    /// Serialize for transmission.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SEQ_HEADER_SIZE + self.body.len());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Parse a received datagram. Does not authenticate.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() < Self::MIN_SIZE {
            return Err(MessageError::TooShort {
                expected: Self::MIN_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            seq: u64::from_be_bytes(data[..SEQ_HEADER_SIZE].try_into().unwrap()),
            body: data[SEQ_HEADER_SIZE..].to_vec(),
        })
    }
}
