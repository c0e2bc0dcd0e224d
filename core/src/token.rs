// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Payment token value objects
//!
//! Tokens are produced once per payment request and handed to the
//! consumer (wallet / UI layer) as immutable values, persistence is an
//! external concern. Consumers never receive keystore access.

use byteorder::{ByteOrder, LittleEndian};
use strum::{Display, EnumIter, EnumString};

use crate::crypto::CryptoError;

/// Token nonce length
pub const NONCE_LEN: usize = 16;

/// Contactless protocol identifiers
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
pub enum ProtocolId {
    #[strum(serialize = "ISO 14443-A")]
    Iso14443a,
    #[strum(serialize = "ISO 14443-B")]
    Iso14443b,
    #[strum(serialize = "FeliCa")]
    FeliCa,
    #[strum(serialize = "ISO 15693")]
    Iso15693,
}

/// Sealed payment token
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PaymentToken {
    /// Base64 encoded nonce plus sealed payload
    pub token: String,
    /// Base64 encoded HMAC over the payload under the session key
    pub signature: String,
    /// Issuing timestamp (milliseconds since the unix epoch)
    pub timestamp_ms: u64,
    /// Protocol the token was issued for
    pub protocol: ProtocolId,
}

/// Wallet-style token header carrying the ephemeral key-agreement half
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct WalletTokenHeader {
    /// Ephemeral key-agreement public key
    pub ephemeral_public_key: [u8; 32],
    /// SHA-256 hash of the ephemeral public key
    pub public_key_hash: [u8; 32],
    /// Random transaction identifier
    pub transaction_id: [u8; NONCE_LEN],
}

/// Wallet-style payment token
///
/// Mirrors a wallet token format for downstream consumption, this is
/// not a certified implementation of any real wallet protocol.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WalletToken {
    /// Base64 token string
    pub token: String,
    /// Sealed masked-card payload
    pub payment_data: Vec<u8>,
    /// Token header
    pub header: WalletTokenHeader,
}

/// Cleartext payment token payload
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TokenPayload {
    /// Amount in minor currency units
    pub amount_minor: u64,
    /// Merchant identifier
    pub merchant_id: String,
    /// Issuing timestamp (milliseconds since the unix epoch)
    pub timestamp_ms: u64,
    /// Random per-token nonce, also bound into the sealing key
    pub nonce: [u8; NONCE_LEN],
}

impl TokenPayload {
    /// Fixed-field prefix length ahead of the merchant id
    const HEADER_LEN: usize = 8 + 8 + NONCE_LEN;

    /// Encode the payload (little-endian fixed fields, merchant id tail)
    pub fn encode(&self) -> Vec<u8> {
        let mut buff = vec![0u8; Self::HEADER_LEN + self.merchant_id.len()];

        LittleEndian::write_u64(&mut buff[..8], self.amount_minor);
        LittleEndian::write_u64(&mut buff[8..16], self.timestamp_ms);
        buff[16..16 + NONCE_LEN].copy_from_slice(&self.nonce);
        buff[Self::HEADER_LEN..].copy_from_slice(self.merchant_id.as_bytes());

        buff
    }

    /// Decode a payload
    pub fn decode(buff: &[u8]) -> Result<Self, CryptoError> {
        if buff.len() < Self::HEADER_LEN {
            return Err(CryptoError::InvalidEncoding);
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buff[16..16 + NONCE_LEN]);

        Ok(Self {
            amount_minor: LittleEndian::read_u64(&buff[..8]),
            timestamp_ms: LittleEndian::read_u64(&buff[8..16]),
            nonce,
            merchant_id: core::str::from_utf8(&buff[Self::HEADER_LEN..])
                .map_err(|_| CryptoError::InvalidEncoding)?
                .to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn payload_roundtrip() {
        let p = TokenPayload {
            amount_minor: 149_900,
            merchant_id: "merchant.example.shop".to_string(),
            timestamp_ms: 1_700_000_000_000,
            nonce: [7u8; NONCE_LEN],
        };

        let buff = p.encode();
        assert_eq!(buff.len(), 32 + p.merchant_id.len());

        let decoded = TokenPayload::decode(&buff).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn payload_short_buffer() {
        assert_eq!(
            TokenPayload::decode(&[0u8; 16]),
            Err(CryptoError::InvalidEncoding)
        );
    }

    #[test]
    fn protocol_display() {
        assert_eq!(ProtocolId::Iso14443a.to_string(), "ISO 14443-A");
        assert_eq!("FeliCa".parse::<ProtocolId>(), Ok(ProtocolId::FeliCa));
    }
}
