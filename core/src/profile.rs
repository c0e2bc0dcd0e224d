// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Emulated card profile
//!
//! The data the emulated card exposes over READ BINARY / GET DATA.
//! Profiles are supplied by the caller (UI / persistence layer) and are
//! immutable once an emulation session starts, the core never generates
//! or validates them against a real issuer.

use sha2::{Digest, Sha256};

use crate::apdu::records::CardRecords;

/// Primary account number length (digits)
pub const PAN_LEN: usize = 16;

/// Card UID length, derived from the profile fields
pub const UID_LEN: usize = 7;

/// Card expiry date (month / year)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Expiry {
    pub month: u8,
    pub year: u8,
}

impl core::fmt::Display for Expiry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.year)
    }
}

impl core::str::FromStr for Expiry {
    type Err = ProfileError;

    /// Parse an `MM/YY` expiry string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (m, y) = s.split_once('/').ok_or(ProfileError::InvalidExpiry)?;

        let month: u8 = m.parse().map_err(|_| ProfileError::InvalidExpiry)?;
        let year: u8 = y.parse().map_err(|_| ProfileError::InvalidExpiry)?;

        if !(1..=12).contains(&month) || m.len() != 2 || y.len() != 2 {
            return Err(ProfileError::InvalidExpiry);
        }

        Ok(Self { month, year })
    }
}

/// Card profile errors
#[derive(Copy, Clone, PartialEq, Debug, thiserror::Error)]
pub enum ProfileError {
    /// PAN is not a 16 digit numeric string
    #[error("PAN must be a {PAN_LEN} digit numeric string")]
    InvalidPan,

    /// Expiry is not a valid MM/YY date
    #[error("expiry must be a valid MM/YY date")]
    InvalidExpiry,

    /// Holder name missing or oversized
    #[error("holder name must be 1..=26 characters")]
    InvalidHolder,
}

/// Emulated card profile
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CardProfile {
    pan: String,
    expiry: Expiry,
    holder: String,
    issuer: String,
}

impl CardProfile {
    /// Create a card profile, validating field shape (not issuer truth)
    pub fn new(pan: &str, expiry: &str, holder: &str, issuer: &str) -> Result<Self, ProfileError> {
        if pan.len() != PAN_LEN || !pan.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProfileError::InvalidPan);
        }

        if holder.is_empty() || holder.len() > 26 {
            return Err(ProfileError::InvalidHolder);
        }

        Ok(Self {
            pan: pan.to_string(),
            expiry: expiry.parse()?,
            holder: holder.to_string(),
            issuer: issuer.to_string(),
        })
    }

    /// Primary account number
    pub fn pan(&self) -> &str {
        &self.pan
    }

    /// Expiry date
    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// Cardholder name
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Issuing bank name
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// PAN masked to last-four form for display / token payloads
    pub fn masked_pan(&self) -> String {
        let last_four = &self.pan[self.pan.len() - 4..];
        format!("•••• •••• •••• {last_four}")
    }

    /// Card UID derived from the profile fields
    ///
    /// Stable for a given profile so re-detection of the same card is
    /// observable by the reader role.
    pub fn card_uid(&self) -> [u8; UID_LEN] {
        let h = Sha256::new()
            .chain_update(self.pan.as_bytes())
            .chain_update(self.expiry.to_string().as_bytes())
            .chain_update(self.holder.as_bytes())
            .finalize();

        let mut uid = [0u8; UID_LEN];
        uid.copy_from_slice(&h[..UID_LEN]);
        uid
    }

    /// TLV encoded card records for READ BINARY / GET DATA, unmasked
    pub fn encode_records(&self) -> Result<crate::apdu::records::RecordsBuf, crate::apdu::ApduError> {
        let expiry = self.expiry.to_string();

        CardRecords {
            pan: &self.pan,
            expiry: &expiry,
            holder: &self.holder,
        }
        .encode()
    }
}
