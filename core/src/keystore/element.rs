// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure element capability
//!
//! Hardware-backed keystores (secure enclaves, SEs) differ per platform,
//! the engine sees them through a small capability surface: key
//! generation, signing, and owner-presence authorization. A pure
//! software variant is the default, a hardware variant is selected by
//! configuration when the platform provides one.

use std::collections::BTreeMap;

use ed25519_dalek::{Signer, SigningKey};
use rand_core::OsRng;

use super::KeyStoreError;

/// Handle to a key held by a secure element
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyHandle(String);

impl KeyHandle {
    /// Tag the key was generated under
    pub fn tag(&self) -> &str {
        &self.0
    }
}

/// Hardware keystore capability
///
/// Implemented by platform secure element integrations, supplied by the
/// embedding application.
pub trait HardwareKeystore: Send {
    /// Generate (or load) a signing key under the provided tag
    fn generate_key(&mut self, tag: &str) -> Result<KeyHandle, KeyStoreError>;

    /// Sign data with a held key
    fn sign(&self, handle: &KeyHandle, data: &[u8]) -> Result<Vec<u8>, KeyStoreError>;

    /// Request an owner-presence (biometric) check
    fn authorize_user(&self, reason: &str) -> Result<bool, KeyStoreError>;
}

/// Pure software keystore, the default element variant
///
/// Keys live in process memory, owner-presence checks always pass.
#[derive(Default)]
pub struct SoftwareKeystore {
    keys: BTreeMap<String, SigningKey>,
}

impl SoftwareKeystore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Secure element variants
///
/// A tagged variant rather than bare trait objects so capability checks
/// (`is_hardware_backed`) stay explicit at the call site.
pub enum SecureElement {
    /// Software keys, always available
    Software(SoftwareKeystore),
    /// Platform hardware keystore
    Hardware(Box<dyn HardwareKeystore>),
}

impl Default for SecureElement {
    fn default() -> Self {
        SecureElement::Software(SoftwareKeystore::new())
    }
}

impl SecureElement {
    /// Check whether key material is hardware isolated
    pub fn is_hardware_backed(&self) -> bool {
        matches!(self, SecureElement::Hardware(_))
    }

    /// Generate (or load) a signing key under the provided tag
    pub fn generate_key(&mut self, tag: &str) -> Result<KeyHandle, KeyStoreError> {
        match self {
            SecureElement::Software(s) => {
                s.keys
                    .entry(tag.to_string())
                    .or_insert_with(|| SigningKey::generate(&mut OsRng));
                Ok(KeyHandle(tag.to_string()))
            }
            SecureElement::Hardware(h) => h.generate_key(tag),
        }
    }

    /// Sign data with a held key
    pub fn sign(&self, handle: &KeyHandle, data: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        match self {
            SecureElement::Software(s) => {
                let key = s
                    .keys
                    .get(handle.tag())
                    .ok_or(KeyStoreError::UnknownKeyHandle)?;
                Ok(key.sign(data).to_bytes().to_vec())
            }
            SecureElement::Hardware(h) => h.sign(handle, data),
        }
    }

    /// Request an owner-presence check
    pub fn authorize_user(&self, reason: &str) -> Result<bool, KeyStoreError> {
        match self {
            SecureElement::Software(_) => {
                log::debug!("software element, auto-authorizing '{reason}'");
                Ok(true)
            }
            SecureElement::Hardware(h) => h.authorize_user(reason),
        }
    }
}
