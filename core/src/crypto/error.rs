// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::keystore::KeyStoreError;

/// [CryptoEngine][super::CryptoEngine] errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum CryptoError {
    /// AEAD open failed: tampered ciphertext or wrong key, no partial
    /// plaintext is ever returned
    #[error("authentication failure")]
    AuthenticationFailure,

    /// Crypto operation requested with no live session key
    #[error("no active session key")]
    NoActiveSession,

    /// Key bytes of an unexpected shape
    #[error("invalid key material")]
    InvalidKey,

    /// Payload bytes failed to decode
    #[error("invalid payload encoding")]
    InvalidEncoding,

    /// Keystore refused the operation
    #[error("keystore: {0}")]
    KeyStore(#[from] KeyStoreError),
}
