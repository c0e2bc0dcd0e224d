// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::coordinator::TransactionState;

/// Cardem library error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport collaborator failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Counterpart answered with a non-success status word
    #[error("unexpected status word {0:04X}")]
    Status(u16),

    /// Counterpart payload failed to decode
    #[error("unexpected response payload")]
    UnexpectedResponse,

    /// Invalid transaction state
    #[error("invalid transaction state (actual: {0}, expected: {1})")]
    InvalidState(TransactionState, TransactionState),

    /// Re-detection while a transaction is active
    #[error("transaction already in progress")]
    TransactionInProgress,

    /// Counterpart authentication failed
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Card profile rejected
    #[error("card profile rejected: {0}")]
    Profile(#[from] cardem_core::profile::ProfileError),

    /// Engine operation failed
    #[error("engine: {0}")]
    Engine(#[from] cardem_core::engine::Error),

    /// Keystore operation failed
    #[error("keystore: {0}")]
    KeyStore(#[from] cardem_core::keystore::KeyStoreError),

    /// Wire encoding failed
    #[error("apdu encoding failed")]
    Apdu(cardem_apdu::ApduError),
}

impl From<cardem_apdu::ApduError> for Error {
    fn from(e: cardem_apdu::ApduError) -> Self {
        Error::Apdu(e)
    }
}
