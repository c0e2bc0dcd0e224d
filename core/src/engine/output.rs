// Copyright (c) 2022-2023 The MobileCoin Foundation

use encdec::Encode;

use crate::apdu::auth::{AuthResponse, CryptogramResp, CHALLENGE_LEN};
use crate::apdu::records::RecordsBuf;
use crate::apdu::{ApduError, StatusWord};

/// [`Engine`][super::Engine] outputs (in response to events), encoded to
/// response buffers as payload plus success status word
#[derive(Clone, PartialEq, Debug)]
pub enum Output {
    /// Bare acknowledgement (`90 00`)
    Ack,

    /// TLV encoded card records
    Records(RecordsBuf),

    /// Random challenge
    Challenge([u8; CHALLENGE_LEN]),

    /// Authentication response (challenge plus MAC)
    Auth(AuthResponse),

    /// Application cryptogram
    Cryptogram(CryptogramResp),
}

impl Output {
    /// Encode the output to a response buffer, appending the success
    /// status word, returning the total length
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let n = match self {
            Output::Ack => 0,
            Output::Records(r) => {
                if buff.len() < r.len() {
                    return Err(ApduError::InvalidLength);
                }
                buff[..r.len()].copy_from_slice(r);
                r.len()
            }
            Output::Challenge(c) => {
                if buff.len() < c.len() {
                    return Err(ApduError::InvalidLength);
                }
                buff[..c.len()].copy_from_slice(c);
                c.len()
            }
            Output::Auth(a) => a.encode(buff)?,
            Output::Cryptogram(c) => c.encode(buff)?,
        };

        if buff.len() < n + 2 {
            return Err(ApduError::InvalidLength);
        }
        buff[n] = StatusWord::Success.sw1();
        buff[n + 1] = StatusWord::Success.sw2();

        Ok(n + 2)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::apdu::ApduResponse;

    #[test]
    fn encode_ack() {
        let mut buff = [0u8; 8];
        let n = Output::Ack.encode(&mut buff).unwrap();

        assert_eq!(&buff[..n], &[0x90, 0x00]);
    }

    #[test]
    fn encode_challenge() {
        let mut buff = [0u8; 16];
        let n = Output::Challenge([0xab; 8]).encode(&mut buff).unwrap();

        let r = ApduResponse::parse(&buff[..n]).unwrap();
        assert!(r.is_success());
        assert_eq!(r.data, &[0xab; 8]);
    }

    #[test]
    fn encode_auth_response() {
        let a = AuthResponse {
            challenge: [1u8; 8],
            mac: [2u8; 32],
        };

        let mut buff = [0u8; 64];
        let n = Output::Auth(a).encode(&mut buff).unwrap();
        assert_eq!(n, 8 + 32 + 2);

        let r = ApduResponse::parse(&buff[..n]).unwrap();
        assert!(r.is_success());
        assert_eq!(&r.data[..8], &[1u8; 8]);
        assert_eq!(&r.data[8..], &[2u8; 32]);
    }

    #[test]
    fn encode_overflow() {
        let mut buff = [0u8; 4];
        let r = Output::Challenge([0u8; 8]).encode(&mut buff);

        assert_eq!(r, Err(ApduError::InvalidLength));
    }
}
