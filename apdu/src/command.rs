// Copyright (c) 2022-2023 The MobileCoin Foundation

//! APDU command header parsing and construction

use heapless::Vec;

use crate::{ApduError, Instruction};

/// Maximum command data length (short Lc)
pub const MAX_DATA_LEN: usize = 255;

/// Parsed APDU command header
///
/// Borrows the command data from the inbound buffer, commands are
/// processed to completion before the buffer is reused.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ApduCommand<'a> {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// First parameter byte
    pub p1: u8,
    /// Second parameter byte
    pub p2: u8,
    /// Command data field (without Lc / Le)
    pub data: &'a [u8],
}

impl<'a> ApduCommand<'a> {
    /// Parse a command from an inbound buffer
    ///
    /// Buffers shorter than a full four byte header are rejected with
    /// [`ApduError::InvalidLength`], interpreters classify these as
    /// [`Instruction::Unknown`].
    pub fn parse(buff: &'a [u8]) -> Result<Self, ApduError> {
        if buff.len() < 4 {
            return Err(ApduError::InvalidLength);
        }

        // Lc-prefixed data field when present, trailing Le accepted
        // and ignored (responses are always returned in full)
        let data = match buff.len() {
            4 | 5 => &[][..],
            _ => {
                let lc = buff[4] as usize;
                if buff.len() < 5 + lc {
                    return Err(ApduError::InvalidLength);
                }
                &buff[5..5 + lc]
            }
        };

        Ok(Self {
            cla: buff[0],
            ins: buff[1],
            p1: buff[2],
            p2: buff[3],
            data,
        })
    }

    /// Classify the command instruction
    pub fn instruction(&self) -> Instruction {
        Instruction::classify(self.cla, self.ins)
    }
}

/// APDU command builder for the reader role
#[derive(Clone, PartialEq, Debug)]
pub struct CommandBuilder {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8, MAX_DATA_LEN>,
    le: Option<u8>,
}

impl CommandBuilder {
    /// Create a command builder with the provided header
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set the command data field
    pub fn data(mut self, data: &[u8]) -> Self {
        self.data.clear();
        // Oversize data is a programmer error, commands are fixed-form
        let _ = self.data.extend_from_slice(data);
        self
    }

    /// Set the expected response length
    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Encode the command to wire form
    pub fn build(&self) -> Vec<u8, { MAX_DATA_LEN + 6 }> {
        let mut apdu = Vec::new();

        let _ = apdu.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        if !self.data.is_empty() {
            let _ = apdu.push(self.data.len() as u8);
            let _ = apdu.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            let _ = apdu.push(le);
        }

        apdu
    }
}

/// Builders for the supported command set
pub mod commands {
    use super::CommandBuilder;
    use crate::Instruction;

    fn builder(i: Instruction, p1: u8, p2: u8) -> CommandBuilder {
        // Unwrap is safe for every instruction with a wire form
        let (cla, ins) = i.header().unwrap();
        CommandBuilder::new(cla, ins, p1, p2)
    }

    /// SELECT the payment application by AID
    pub fn select(aid: &[u8]) -> CommandBuilder {
        builder(Instruction::Select, 0x04, 0x00).data(aid).le(0x00)
    }

    /// READ BINARY for the card data records
    pub fn read_binary() -> CommandBuilder {
        builder(Instruction::ReadBinary, 0x00, 0x00).le(0x00)
    }

    /// GET CHALLENGE for an 8 byte random value
    pub fn get_challenge() -> CommandBuilder {
        builder(Instruction::GetChallenge, 0x00, 0x00).le(0x08)
    }

    /// EXTERNAL AUTHENTICATE with terminal authentication data
    pub fn external_authenticate(data: &[u8]) -> CommandBuilder {
        builder(Instruction::ExternalAuthenticate, 0x00, 0x00).data(data)
    }

    /// INTERNAL AUTHENTICATE against a terminal challenge
    pub fn internal_authenticate(challenge: &[u8]) -> CommandBuilder {
        builder(Instruction::InternalAuthenticate, 0x00, 0x00)
            .data(challenge)
            .le(0x00)
    }

    /// GENERATE AC requesting an application cryptogram
    pub fn generate_ac(reference: u8, data: &[u8]) -> CommandBuilder {
        builder(Instruction::GenerateAc, reference, 0x00)
            .data(data)
            .le(0x00)
    }

    /// GET DATA for the card data records
    pub fn get_data() -> CommandBuilder {
        builder(Instruction::GetData, 0x00, 0x00).le(0x00)
    }

    /// PUT DATA write (acknowledged, no persistent effect on the card)
    pub fn put_data(data: &[u8]) -> CommandBuilder {
        builder(Instruction::PutData, 0x00, 0x00).data(data)
    }

    /// UPDATE BINARY write (acknowledged, no persistent effect on the card)
    pub fn update_binary(data: &[u8]) -> CommandBuilder {
        builder(Instruction::UpdateBinary, 0x00, 0x00).data(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_header_only() {
        let c = ApduCommand::parse(&[0x00, 0xA4, 0x04, 0x00]).unwrap();

        assert_eq!(c.instruction(), Instruction::Select);
        assert_eq!(c.data, &[]);
    }

    #[test]
    fn parse_with_data() {
        let buff = [0x00, 0x88, 0x00, 0x00, 0x03, 0xaa, 0xbb, 0xcc, 0x00];
        let c = ApduCommand::parse(&buff).unwrap();

        assert_eq!(c.instruction(), Instruction::InternalAuthenticate);
        assert_eq!(c.data, &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn parse_short_buffers() {
        for buff in [&[][..], &[0x00][..], &[0x00, 0xA4][..], &[0x00, 0xA4, 0x04][..]] {
            assert_eq!(ApduCommand::parse(buff), Err(ApduError::InvalidLength));
        }
    }

    #[test]
    fn parse_truncated_data() {
        // Lc claims 4 bytes, only 2 present
        let buff = [0x00, 0x88, 0x00, 0x00, 0x04, 0xaa, 0xbb];
        assert_eq!(ApduCommand::parse(&buff), Err(ApduError::InvalidLength));
    }

    #[test]
    fn build_select() {
        let apdu = commands::select(&crate::CARD_AID).build();

        assert_eq!(&apdu[..4], &[0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(apdu[4] as usize, crate::CARD_AID.len());
        assert_eq!(&apdu[5..5 + crate::CARD_AID.len()], &crate::CARD_AID);
        assert_eq!(apdu[apdu.len() - 1], 0x00);

        // Builders produce parseable commands
        let c = ApduCommand::parse(&apdu).unwrap();
        assert_eq!(c.instruction(), Instruction::Select);
        assert_eq!(c.data, &crate::CARD_AID);
    }

    #[test]
    fn build_get_challenge() {
        let apdu = commands::get_challenge().build();
        assert_eq!(&apdu[..], &[0x00, 0x84, 0x00, 0x00, 0x08]);
    }
}
