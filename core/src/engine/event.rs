// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::apdu::{ApduCommand, Instruction};

/// [`Engine`][super::Engine] input events, decoded from request APDUs
///
/// Malformed buffers (shorter than a full header) and unrecognised
/// class / instruction pairs classify as [`Event::Unknown`] rather than
/// failing, the interpreter answers those with a rejection status word.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Event<'a> {
    /// Select the payment application
    Select { aid: &'a [u8] },

    /// Read the TLV card records
    ReadBinary,

    /// Fetch an 8 byte random challenge
    GetChallenge,

    /// Terminal-presented authentication data
    ExternalAuthenticate { data: &'a [u8] },

    /// Request a card authentication response
    InternalAuthenticate { challenge: &'a [u8] },

    /// Request an application cryptogram
    GenerateAc { reference: u8, data: &'a [u8] },

    /// Fetch the card data object (same payload as ReadBinary)
    GetData,

    /// Write a data object (acknowledged, no persistent effect)
    PutData { data: &'a [u8] },

    /// Update card records (acknowledged, no persistent effect)
    UpdateBinary { data: &'a [u8] },

    /// Unrecognised or malformed command
    Unknown,
}

impl<'a> Event<'a> {
    /// Parse an inbound command buffer to an engine event
    ///
    /// Total: every buffer maps to an event.
    pub fn parse(buff: &'a [u8]) -> Self {
        let cmd = match ApduCommand::parse(buff) {
            Ok(c) => c,
            Err(_) => return Event::Unknown,
        };

        Event::from(cmd)
    }
}

impl<'a> From<ApduCommand<'a>> for Event<'a> {
    fn from(cmd: ApduCommand<'a>) -> Self {
        match cmd.instruction() {
            Instruction::Select => Event::Select { aid: cmd.data },
            Instruction::ReadBinary => Event::ReadBinary,
            Instruction::GetChallenge => Event::GetChallenge,
            Instruction::ExternalAuthenticate => Event::ExternalAuthenticate { data: cmd.data },
            Instruction::InternalAuthenticate => Event::InternalAuthenticate {
                challenge: cmd.data,
            },
            Instruction::GenerateAc => Event::GenerateAc {
                reference: cmd.p1,
                data: cmd.data,
            },
            Instruction::GetData => Event::GetData,
            Instruction::PutData => Event::PutData { data: cmd.data },
            Instruction::UpdateBinary => Event::UpdateBinary { data: cmd.data },
            Instruction::Unknown => Event::Unknown,
        }
    }
}
