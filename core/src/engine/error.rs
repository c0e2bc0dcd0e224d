// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::apdu::StatusWord;
use crate::crypto::CryptoError;
use crate::keystore::KeyStoreError;

/// [Engine][super::Engine] errors
///
/// Every error maps to a response status word so protocol failures are
/// recovered locally and never escape the interpreter boundary.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
#[repr(u8)]
pub enum Error {
    /// No card profile loaded
    #[error("no card profile loaded")]
    ProfileMissing = 0x00,

    /// Command rejected in the current state
    #[error("command not allowed")]
    CommandNotAllowed = 0x01,

    /// Malformed command parameters
    #[error("invalid command parameters")]
    InvalidParameters = 0x02,

    /// No live session key for a cryptographic operation
    #[error("no active session")]
    NoActiveSession = 0x03,

    /// Cryptographic operation failed
    #[error("cryptographic failure")]
    CryptoFailed = 0x04,

    /// Keystore refused or failed the operation
    #[error("keystore unavailable")]
    KeyStoreFailed = 0x05,

    /// Response encoding failed
    #[error("response encoding failed")]
    EncodingFailed = 0x06,
}

impl Error {
    /// Map an error to its response status word
    pub fn status_word(&self) -> StatusWord {
        match self {
            Error::ProfileMissing => StatusWord::FileNotFound,
            Error::InvalidParameters => StatusWord::IncorrectParameters,
            Error::CommandNotAllowed
            | Error::NoActiveSession
            | Error::CryptoFailed
            | Error::KeyStoreFailed
            | Error::EncodingFailed => StatusWord::CommandNotAllowed,
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::NoActiveSession => Error::NoActiveSession,
            _ => Error::CryptoFailed,
        }
    }
}

impl From<KeyStoreError> for Error {
    fn from(_: KeyStoreError) -> Self {
        Error::KeyStoreFailed
    }
}
