// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for contactless payment card emulation
//!
//! This module provides the wire-level protocol shared between the card
//! and terminal (reader) roles: ISO 7816-4 command headers, the closed
//! instruction set supported by the emulated payment application, status
//! words, and the TLV record layout used for card data.
//!
//! Commands are a plain ISO 7816 header (`CLA INS P1 P2 [Lc data] [Le]`),
//! responses are payload bytes followed by a two byte status word.
//! Structured response payloads (authentication responses, cryptograms)
//! carry fixed little-endian encodings so they can be decoded without an
//! allocator on constrained platforms.

#![no_std]

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

pub mod command;
pub use command::{ApduCommand, CommandBuilder};

pub mod response;
pub use response::ApduResponse;

pub mod records;

pub mod auth;

mod helpers;

/// Interindustry APDU class
pub const ISO_CLA: u8 = 0x00;

/// Proprietary (payment scheme) APDU class
pub const PAY_CLA: u8 = 0x80;

/// Application identifier for the emulated payment application
pub const CARD_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x09, 0x90, 0x01, 0x01];

/// Answer To Reset reported for the emulated contactless card
pub const CARD_ATR: [u8; 18] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00, 0x00,
    0x00, 0x00, 0x00,
];

/// Supported instruction set
///
/// Commands are classified by `(CLA, INS)` pair, unrecognised pairs (and
/// buffers shorter than a full header) classify as [`Instruction::Unknown`].
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumIter)]
pub enum Instruction {
    /// Select the payment application
    Select,
    /// Read card data records
    ReadBinary,
    /// Fetch a random challenge
    GetChallenge,
    /// Terminal-presented authentication
    ExternalAuthenticate,
    /// Card-computed authentication response
    InternalAuthenticate,
    /// Generate an application cryptogram
    GenerateAc,
    /// Fetch a card data object
    GetData,
    /// Write a card data object
    PutData,
    /// Update card data records
    UpdateBinary,
    /// Unrecognised command
    Unknown,
}

impl Instruction {
    /// Classify an instruction from a `(CLA, INS)` pair
    pub fn classify(cla: u8, ins: u8) -> Self {
        match (cla, ins) {
            (ISO_CLA, 0xA4) => Instruction::Select,
            (ISO_CLA, 0xB0) => Instruction::ReadBinary,
            (ISO_CLA, 0x84) => Instruction::GetChallenge,
            (ISO_CLA, 0x82) => Instruction::ExternalAuthenticate,
            (ISO_CLA, 0x88) => Instruction::InternalAuthenticate,
            (PAY_CLA, 0xAE) => Instruction::GenerateAc,
            (PAY_CLA, 0xCA) => Instruction::GetData,
            (PAY_CLA, 0xDA) => Instruction::PutData,
            (ISO_CLA, 0xD6) => Instruction::UpdateBinary,
            _ => Instruction::Unknown,
        }
    }

    /// Fetch the `(CLA, INS)` pair for a classified instruction
    ///
    /// Returns `None` for [`Instruction::Unknown`] which has no wire form.
    pub fn header(&self) -> Option<(u8, u8)> {
        let h = match self {
            Instruction::Select => (ISO_CLA, 0xA4),
            Instruction::ReadBinary => (ISO_CLA, 0xB0),
            Instruction::GetChallenge => (ISO_CLA, 0x84),
            Instruction::ExternalAuthenticate => (ISO_CLA, 0x82),
            Instruction::InternalAuthenticate => (ISO_CLA, 0x88),
            Instruction::GenerateAc => (PAY_CLA, 0xAE),
            Instruction::GetData => (PAY_CLA, 0xCA),
            Instruction::PutData => (PAY_CLA, 0xDA),
            Instruction::UpdateBinary => (ISO_CLA, 0xD6),
            Instruction::Unknown => return None,
        };
        Some(h)
    }
}

/// Response status words
#[derive(Copy, Clone, PartialEq, Debug, TryFromPrimitive, Display)]
#[repr(u16)]
pub enum StatusWord {
    /// Command processed
    Success = 0x9000,
    /// Command not allowed in the current state
    CommandNotAllowed = 0x6982,
    /// Referenced file / record not found
    FileNotFound = 0x6A82,
    /// Incorrect command parameters
    IncorrectParameters = 0x6A86,
}

impl StatusWord {
    /// First status byte
    pub const fn sw1(&self) -> u8 {
        (*self as u16 >> 8) as u8
    }

    /// Second status byte
    pub const fn sw2(&self) -> u8 {
        (*self as u16 & 0xFF) as u8
    }
}

/// APDU parse / encode errors
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ApduError {
    /// Buffer too short for the object
    InvalidLength,
    /// Object bytes failed to decode
    InvalidEncoding,
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            _ => ApduError::InvalidEncoding,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_instructions() {
        let tests = &[
            (0x00, 0xA4, Instruction::Select),
            (0x00, 0xB0, Instruction::ReadBinary),
            (0x00, 0x84, Instruction::GetChallenge),
            (0x00, 0x82, Instruction::ExternalAuthenticate),
            (0x00, 0x88, Instruction::InternalAuthenticate),
            (0x80, 0xAE, Instruction::GenerateAc),
            (0x80, 0xCA, Instruction::GetData),
            (0x80, 0xDA, Instruction::PutData),
            (0x00, 0xD6, Instruction::UpdateBinary),
            // Class / instruction mismatches classify as unknown
            (0x80, 0xA4, Instruction::Unknown),
            (0x00, 0xAE, Instruction::Unknown),
            (0xFF, 0xFF, Instruction::Unknown),
        ];

        for (cla, ins, i) in tests {
            assert_eq!(Instruction::classify(*cla, *ins), *i, "({cla:02x}, {ins:02x})");
        }
    }

    #[test]
    fn classify_roundtrip() {
        use strum::IntoEnumIterator;

        for i in Instruction::iter() {
            let (cla, ins) = match i.header() {
                Some(v) => v,
                None => continue,
            };
            assert_eq!(Instruction::classify(cla, ins), i);
        }
    }

    #[test]
    fn status_word_bytes() {
        assert_eq!((StatusWord::Success.sw1(), StatusWord::Success.sw2()), (0x90, 0x00));
        assert_eq!(
            (StatusWord::CommandNotAllowed.sw1(), StatusWord::CommandNotAllowed.sw2()),
            (0x69, 0x82)
        );
        assert_eq!(
            (StatusWord::FileNotFound.sw1(), StatusWord::FileNotFound.sw2()),
            (0x6A, 0x82)
        );
        assert_eq!(
            (StatusWord::IncorrectParameters.sw1(), StatusWord::IncorrectParameters.sw2()),
            (0x6A, 0x86)
        );
    }
}
