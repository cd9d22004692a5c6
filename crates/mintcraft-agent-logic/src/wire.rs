//! Transaction frame handling for locally signed transactions
//!
//! Frame layout: compact-u16 signature count, that many 64-byte signature
//! slots, then the message. The message starts with an optional version
//! prefix (high bit set), a 3-byte header whose first byte is the number of
//! required signers, and a compact-u16 count of 32-byte account keys. The
//! first `num_required_signatures` keys are the signers, in slot order.

use thiserror::Error;

pub const SIGNATURE_LEN: usize = 64;
pub const PUBKEY_LEN: usize = 32;

const VERSION_PREFIX_MASK: u8 = 0x80;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame truncated at offset {0}")]
    Truncated(usize),
    #[error("invalid compact-u16 length at offset {0}")]
    BadLength(usize),
    #[error("signature count {slots} does not match required signers {required}")]
    SignerMismatch { slots: usize, required: usize },
    #[error("key {0} is not a required signer of this transaction")]
    NotASigner(String),
}

/// Parsed view over a transaction frame
#[derive(Debug, Clone)]
pub struct TransactionFrame<'a> {
    bytes: &'a [u8],
    signatures_offset: usize,
    num_signatures: usize,
    message_offset: usize,
    signers: Vec<[u8; PUBKEY_LEN]>,
}

fn decode_compact_u16(bytes: &[u8], offset: usize) -> Result<(usize, usize), WireError> {
    let mut value = 0usize;
    for i in 0..3 {
        let byte = *bytes.get(offset + i).ok_or(WireError::Truncated(offset + i))?;
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(WireError::BadLength(offset))
}

/// Encode a length as compact-u16
pub fn encode_compact_u16(mut value: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

impl<'a> TransactionFrame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        let (num_signatures, len) = decode_compact_u16(bytes, 0)?;
        let signatures_offset = len;
        let message_offset = signatures_offset + num_signatures * SIGNATURE_LEN;
        if bytes.len() < message_offset {
            return Err(WireError::Truncated(bytes.len()));
        }

        let mut cursor = message_offset;
        let first = *bytes.get(cursor).ok_or(WireError::Truncated(cursor))?;
        if first & VERSION_PREFIX_MASK != 0 {
            cursor += 1;
        }
        let required = *bytes.get(cursor).ok_or(WireError::Truncated(cursor))? as usize;
        cursor += 3;
        if required != num_signatures {
            return Err(WireError::SignerMismatch {
                slots: num_signatures,
                required,
            });
        }

        let (num_keys, len) = decode_compact_u16(bytes, cursor)?;
        cursor += len;
        if num_keys < required {
            return Err(WireError::SignerMismatch {
                slots: num_signatures,
                required: num_keys,
            });
        }
        let keys_end = cursor + num_keys * PUBKEY_LEN;
        if bytes.len() < keys_end {
            return Err(WireError::Truncated(bytes.len()));
        }

        let signers = (0..required)
            .map(|i| {
                let start = cursor + i * PUBKEY_LEN;
                let mut key = [0u8; PUBKEY_LEN];
                key.copy_from_slice(&bytes[start..start + PUBKEY_LEN]);
                key
            })
            .collect();

        Ok(Self {
            bytes,
            signatures_offset,
            num_signatures,
            message_offset,
            signers,
        })
    }

    /// Bytes covered by every signature
    pub fn message(&self) -> &'a [u8] {
        &self.bytes[self.message_offset..]
    }

    pub fn num_signatures(&self) -> usize {
        self.num_signatures
    }

    /// Slot index for `pubkey`, if it is a required signer
    pub fn signer_index(&self, pubkey: &[u8; PUBKEY_LEN]) -> Option<usize> {
        self.signers.iter().position(|k| k == pubkey)
    }

    pub fn signature_at(&self, index: usize) -> Option<&'a [u8]> {
        if index >= self.num_signatures {
            return None;
        }
        let start = self.signatures_offset + index * SIGNATURE_LEN;
        Some(&self.bytes[start..start + SIGNATURE_LEN])
    }

    /// Copy of the frame with `signature` written into slot `index`
    pub fn with_signature(&self, index: usize, signature: &[u8; SIGNATURE_LEN]) -> Vec<u8> {
        let mut out = self.bytes.to_vec();
        let start = self.signatures_offset + index * SIGNATURE_LEN;
        out[start..start + SIGNATURE_LEN].copy_from_slice(signature);
        out
    }
}
