// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Authentication / cryptogram response payloads
//!
//! Fixed-layout payloads returned for INTERNAL AUTHENTICATE and
//! GENERATE AC, ahead of the trailing status word.

use encdec::{Decode, Encode};

use crate::helpers::arr;
use crate::ApduError;

/// Challenge length for authentication exchanges
pub const CHALLENGE_LEN: usize = 8;

/// Authentication code (HMAC-SHA-256) length
pub const MAC_LEN: usize = 32;

/// Application cryptogram length
pub const CRYPTOGRAM_LEN: usize = 8;

/// INTERNAL AUTHENTICATE response payload
///
/// A fresh card challenge concatenated with its authentication code
/// under the active session key.
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct AuthResponse {
    /// Card challenge
    #[encdec(with = "arr")]
    pub challenge: [u8; CHALLENGE_LEN],

    /// HMAC over the challenge under the session key
    #[encdec(with = "arr")]
    pub mac: [u8; MAC_LEN],
}

/// GENERATE AC response payload
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ApduError")]
pub struct CryptogramResp {
    /// Truncated application cryptogram
    #[encdec(with = "arr")]
    pub cryptogram: [u8; CRYPTOGRAM_LEN],
}

#[cfg(test)]
mod test {
    use encdec::{Decode, Encode};

    use super::*;

    #[test]
    fn encode_decode_auth_response() {
        let a = AuthResponse {
            challenge: [0xab; CHALLENGE_LEN],
            mac: [0xcd; MAC_LEN],
        };

        let mut buff = [0u8; 64];
        let n = a.encode(&mut buff).unwrap();

        assert_eq!(n, CHALLENGE_LEN + MAC_LEN);
        assert_eq!(n, a.encode_len().unwrap());

        let (decoded, m) = AuthResponse::decode(&buff[..n]).unwrap();
        assert_eq!(decoded, a);
        assert_eq!(m, n);
    }

    #[test]
    fn encode_decode_cryptogram() {
        let c = CryptogramResp {
            cryptogram: [0x11; CRYPTOGRAM_LEN],
        };

        let mut buff = [0u8; 16];
        let n = c.encode(&mut buff).unwrap();
        assert_eq!(n, CRYPTOGRAM_LEN);

        let (decoded, _) = CryptogramResp::decode(&buff[..n]).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn decode_short_buffer() {
        let buff = [0u8; 4];
        assert!(AuthResponse::decode(&buff).is_err());
    }
}
