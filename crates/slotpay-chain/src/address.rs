//! Canonical TON address handling.
//!
//! The same account has many textual encodings: the raw form
//! `workchain:hex64` and the friendly base64 form (bounceable or not,
//! URL-safe or standard alphabet). Sender attribution and destination
//! validation therefore compare the decoded `(workchain, account hash)`
//! pair, never the strings.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use slotpay_types::{Result, SlotpayError};

/// Friendly-form tag byte for bounceable addresses.
const TAG_BOUNCEABLE: u8 = 0x11;
/// Friendly-form tag byte for non-bounceable addresses.
const TAG_NON_BOUNCEABLE: u8 = 0x51;
/// Testnet-only flag OR-ed into the tag byte.
const TAG_TESTNET: u8 = 0x80;

/// A TON account in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TonAddress {
    pub workchain: i8,
    pub hash: [u8; 32],
}

impl TonAddress {
    /// Parse any supported textual encoding.
    ///
    /// # Errors
    /// Returns [`SlotpayError::InvalidDestination`] when the input is
    /// neither a valid raw nor a valid friendly address.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SlotpayError::InvalidDestination {
                reason: "empty address".into(),
            });
        }
        if let Some(address) = Self::parse_raw(trimmed) {
            return Ok(address);
        }
        if let Some(address) = Self::parse_friendly(trimmed) {
            return Ok(address);
        }
        let head: String = trimmed.chars().take(24).collect();
        Err(SlotpayError::InvalidDestination {
            reason: format!("unparseable address: {head}"),
        })
    }

    /// Whether two encodings refer to the same account.
    #[must_use]
    pub fn same_account(a: &str, b: &str) -> bool {
        match (Self::parse(a), Self::parse(b)) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }

    /// Raw form: `workchain:hex64`.
    fn parse_raw(input: &str) -> Option<Self> {
        let (wc_part, hash_part) = input.split_once(':')?;
        let workchain: i8 = wc_part.parse().ok()?;
        if hash_part.len() != 64 {
            return None;
        }
        let bytes = hex::decode(hash_part).ok()?;
        let hash: [u8; 32] = bytes.try_into().ok()?;
        Some(Self { workchain, hash })
    }

    /// Friendly form: 48 base64 chars decoding to
    /// `[tag, workchain, hash[32], crc16[2]]`.
    fn parse_friendly(input: &str) -> Option<Self> {
        if input.len() != 48 {
            return None;
        }
        let bytes = URL_SAFE
            .decode(input)
            .or_else(|_| STANDARD.decode(input))
            .ok()?;
        if bytes.len() != 36 {
            return None;
        }
        let tag = bytes[0] & !TAG_TESTNET;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return None;
        }
        let expected_crc = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16_xmodem(&bytes[..34]) != expected_crc {
            return None;
        }
        #[allow(clippy::cast_possible_wrap)]
        let workchain = bytes[1] as i8;
        let hash: [u8; 32] = bytes[2..34].try_into().ok()?;
        Some(Self { workchain, hash })
    }

    /// Encode as the friendly bounceable URL-safe form.
    #[must_use]
    pub fn to_friendly(&self) -> String {
        let mut bytes = Vec::with_capacity(36);
        bytes.push(TAG_BOUNCEABLE);
        #[allow(clippy::cast_sign_loss)]
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16_xmodem(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(bytes)
    }
}

impl fmt::Display for TonAddress {
    /// Raw form, the unambiguous representation for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.hash))
    }
}

/// CRC-16/XMODEM, as used by the friendly address checksum.
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
