// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::storage::StorageError;

/// [KeyStore][super::KeyStore] errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// Storage backend failure
    #[error("secure storage: {0}")]
    Storage(#[from] StorageError),

    /// Hardware keystore required by configuration but unavailable
    #[error("hardware keystore unavailable")]
    HardwareUnavailable,

    /// Owner-presence check denied
    #[error("user authorization denied")]
    AuthorizationDenied,

    /// Key handle not held by the secure element
    #[error("unknown key handle")]
    UnknownKeyHandle,

    /// Persisted key material failed to decode
    #[error("invalid persisted key material")]
    InvalidKeyMaterial,

    /// Master key rotation aborted, no state was changed
    #[error("master key rotation failed: {0}")]
    RotationFailed(String),

    /// No session key for the provided session id
    #[error("unknown or expired session")]
    UnknownSession,
}
