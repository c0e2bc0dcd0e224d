// Copyright (c) 2022-2023 The MobileCoin Foundation

//! APDU response handling
//!
//! Responses are payload bytes followed by exactly two status bytes,
//! every interpreter invocation produces one (errors are encoded into
//! the status word, never surfaced as a fault).

use crate::{ApduError, StatusWord};

/// Parsed APDU response, borrowing payload data from the response buffer
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ApduResponse<'a> {
    /// Response data (without status word)
    pub data: &'a [u8],
    /// Status word SW1
    pub sw1: u8,
    /// Status word SW2
    pub sw2: u8,
}

impl<'a> ApduResponse<'a> {
    /// Parse a response from an outbound buffer
    pub fn parse(buff: &'a [u8]) -> Result<Self, ApduError> {
        if buff.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        Ok(Self {
            data: &buff[..buff.len() - 2],
            sw1: buff[buff.len() - 2],
            sw2: buff[buff.len() - 1],
        })
    }

    /// Check whether the response indicates success (`90 00`)
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Fetch the full status word as a 16-bit value
    pub fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Decode the status word where it maps to a known [`StatusWord`]
    pub fn status(&self) -> Result<StatusWord, ApduError> {
        StatusWord::try_from(self.status_word()).map_err(|_| ApduError::InvalidEncoding)
    }
}

impl core::fmt::Display for ApduResponse<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in self.data {
            write!(f, "{b:02X}")?;
        }
        write!(f, " {:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Encode a response payload and status word into an outbound buffer,
/// returning the total length
pub fn write_response(buff: &mut [u8], data: &[u8], sw: StatusWord) -> Result<usize, ApduError> {
    if buff.len() < data.len() + 2 {
        return Err(ApduError::InvalidLength);
    }

    buff[..data.len()].copy_from_slice(data);
    buff[data.len()] = sw.sw1();
    buff[data.len() + 1] = sw.sw2();

    Ok(data.len() + 2)
}

/// Encode a status-word-only response into an outbound buffer
pub fn write_status(buff: &mut [u8], sw: StatusWord) -> Result<usize, ApduError> {
    write_response(buff, &[], sw)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_success() {
        let r = ApduResponse::parse(&[0xaa, 0xbb, 0x90, 0x00]).unwrap();

        assert!(r.is_success());
        assert_eq!(r.data, &[0xaa, 0xbb]);
        assert_eq!(r.status_word(), 0x9000);
        assert_eq!(r.status(), Ok(StatusWord::Success));
    }

    #[test]
    fn parse_status_only() {
        let r = ApduResponse::parse(&[0x69, 0x82]).unwrap();

        assert!(!r.is_success());
        assert_eq!(r.data, &[]);
        assert_eq!(r.status(), Ok(StatusWord::CommandNotAllowed));
    }

    #[test]
    fn parse_short() {
        assert_eq!(ApduResponse::parse(&[0x90]), Err(ApduError::InvalidLength));
    }

    #[test]
    fn write_roundtrip() {
        let mut buff = [0u8; 16];

        let n = write_response(&mut buff, &[1, 2, 3], StatusWord::Success).unwrap();
        assert_eq!(&buff[..n], &[1, 2, 3, 0x90, 0x00]);

        let r = ApduResponse::parse(&buff[..n]).unwrap();
        assert_eq!(r.data, &[1, 2, 3]);
        assert!(r.is_success());
    }

    #[test]
    fn write_overflow() {
        let mut buff = [0u8; 4];
        assert_eq!(
            write_response(&mut buff, &[1, 2, 3], StatusWord::Success),
            Err(ApduError::InvalidLength)
        );
    }
}
