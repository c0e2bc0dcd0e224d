// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cryptographic engine
//!
//! Key derivation, authentication codes, AEAD sealing, and payment token
//! assembly. The [CryptoEngine] borrows the [KeyStore] for the duration
//! of a call and never caches or persists key bytes itself.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use byteorder::{ByteOrder, LittleEndian};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::apdu::auth::{AuthResponse, CHALLENGE_LEN, CRYPTOGRAM_LEN, MAC_LEN};
use crate::apdu::records::CardRecords;
use crate::clock::Clock;
use crate::keystore::{KeyStore, SecureStorage, SymmetricKey, KEY_LEN};
use crate::profile::CardProfile;
use crate::token::{PaymentToken, ProtocolId, TokenPayload, WalletToken, WalletTokenHeader, NONCE_LEN};

mod error;
pub use error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// AEAD nonce length (AES-256-GCM)
const AEAD_NONCE_LEN: usize = 12;

/// Key derivation operations
///
/// The operation tag is appended to the caller context to form the HKDF
/// salt, separating keys derived for different purposes from the same
/// master secret.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
pub enum KeyOperation {
    Payment,
    Authentication,
    Encryption,
    Signing,
    Wallet,
}

impl KeyOperation {
    /// Salt tag for this operation
    pub fn tag(&self) -> &'static [u8] {
        match self {
            KeyOperation::Payment => b"payment",
            KeyOperation::Authentication => b"authentication",
            KeyOperation::Encryption => b"encryption",
            KeyOperation::Signing => b"signing",
            KeyOperation::Wallet => b"wallet",
        }
    }
}

/// Derive a subkey from a parent key for an operation and context
///
/// HKDF-SHA256 with salt `context ++ operation tag`, deterministic for
/// identical inputs.
pub fn derive(key: &SymmetricKey, op: KeyOperation, context: &[u8]) -> SymmetricKey {
    let mut salt = Vec::with_capacity(context.len() + op.tag().len());
    salt.extend_from_slice(context);
    salt.extend_from_slice(op.tag());

    let hk = Hkdf::<Sha256>::new(Some(&salt), key.as_bytes());

    let mut okm = [0u8; KEY_LEN];
    // 32 bytes is always a valid HKDF-SHA256 output length
    hk.expand(&[], &mut okm)
        .expect("HKDF output length invariant");

    SymmetricKey::from_bytes(okm)
}

/// HMAC-SHA-256 authentication code over `data`
pub fn sign(data: &[u8], key: &SymmetricKey) -> [u8; MAC_LEN] {
    // HMAC accepts keys of any length
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).expect("HMAC key length invariant");
    mac.update(data);

    mac.finalize().into_bytes().into()
}

/// Verify an HMAC-SHA-256 authentication code (constant time)
pub fn verify(data: &[u8], key: &SymmetricKey, code: &[u8]) -> Result<(), CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).expect("HMAC key length invariant");
    mac.update(data);

    mac.verify_slice(code)
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// AEAD-seal data under the provided key
///
/// AES-256-GCM with a fresh random nonce prepended to the ciphertext.
pub fn aead_seal(data: &[u8], key: &SymmetricKey, rng: &mut impl CryptoRngCore) -> Vec<u8> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce = [0u8; AEAD_NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    // Encryption only fails for oversized payloads (> 64GiB)
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), data)
        .expect("AEAD payload size invariant");

    let mut out = Vec::with_capacity(AEAD_NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    out
}

/// Open an AEAD-sealed blob
///
/// Fails with [CryptoError::AuthenticationFailure] on tamper or wrong
/// key, never returns partial plaintext.
pub fn aead_open(buff: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    if buff.len() < AEAD_NONCE_LEN {
        return Err(CryptoError::AuthenticationFailure);
    }

    let (nonce, ct) = buff.split_at(AEAD_NONCE_LEN);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ct)
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Application cryptogram inputs
///
/// Explicit so conformance tests can fix inputs, the cryptogram is
/// deterministic for identical values.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CryptogramInput {
    /// Application transaction counter
    pub counter: u32,
    /// Unpredictable number (terminal challenge)
    pub unpredictable: [u8; 8],
    /// Transaction date
    pub date: [u8; 6],
    /// Transaction type
    pub tx_type: [u8; 3],
}

impl CryptogramInput {
    /// Encode inputs to the MAC'd form (little-endian counter)
    pub fn to_bytes(&self) -> [u8; 21] {
        let mut b = [0u8; 21];

        LittleEndian::write_u32(&mut b[..4], self.counter);
        b[4..12].copy_from_slice(&self.unpredictable);
        b[12..18].copy_from_slice(&self.date);
        b[18..21].copy_from_slice(&self.tx_type);

        b
    }
}

/// Cryptographic engine over a borrowed [KeyStore]
pub struct CryptoEngine<'a, S: SecureStorage, C: Clock, RNG: CryptoRngCore> {
    keys: &'a KeyStore<S, C, RNG>,
}

impl<'a, S: SecureStorage, C: Clock, RNG: CryptoRngCore> CryptoEngine<'a, S, C, RNG> {
    /// Borrow a keystore for a run of crypto operations
    pub fn new(keys: &'a KeyStore<S, C, RNG>) -> Self {
        Self { keys }
    }

    /// Derive an operation subkey from the master key
    pub fn derive(&self, op: KeyOperation, context: &[u8]) -> SymmetricKey {
        derive(self.keys.master_key(), op, context)
    }

    /// Fetch the live session key or fail
    fn session_key(&self, session_id: &str) -> Result<SymmetricKey, CryptoError> {
        self.keys
            .session_key(session_id)
            .ok_or(CryptoError::NoActiveSession)
    }

    /// Build a challenge / response pair for INTERNAL AUTHENTICATE
    ///
    /// A fresh 8 byte random challenge concatenated with its HMAC under
    /// the active session key.
    pub fn auth_response(
        &self,
        session_id: &str,
        rng: &mut impl CryptoRngCore,
    ) -> Result<AuthResponse, CryptoError> {
        let key = self.session_key(session_id)?;

        let mut challenge = [0u8; CHALLENGE_LEN];
        rng.fill_bytes(&mut challenge);

        Ok(AuthResponse {
            challenge,
            mac: sign(&challenge, &key),
        })
    }

    /// Verify a challenge / response pair under the session key
    pub fn verify_auth_response(
        &self,
        session_id: &str,
        resp: &AuthResponse,
    ) -> Result<(), CryptoError> {
        let key = self.session_key(session_id)?;
        verify(&resp.challenge, &key, &resp.mac)
    }

    /// Compute an application cryptogram for the provided inputs
    pub fn application_cryptogram(
        &self,
        session_id: &str,
        input: &CryptogramInput,
    ) -> Result<[u8; CRYPTOGRAM_LEN], CryptoError> {
        let key = self.session_key(session_id)?;

        let mac = sign(&input.to_bytes(), &key);

        let mut ac = [0u8; CRYPTOGRAM_LEN];
        ac.copy_from_slice(&mac[..CRYPTOGRAM_LEN]);
        Ok(ac)
    }

    /// Verify an application cryptogram against the provided inputs
    pub fn verify_cryptogram(
        &self,
        session_id: &str,
        input: &CryptogramInput,
        cryptogram: &[u8; CRYPTOGRAM_LEN],
    ) -> Result<(), CryptoError> {
        let expected = self.application_cryptogram(session_id, input)?;

        match expected == *cryptogram {
            true => Ok(()),
            false => Err(CryptoError::AuthenticationFailure),
        }
    }

    /// Build a sealed payment token for a payment request
    ///
    /// The payload is sealed under a per-token key derived from the
    /// session key and the token nonce, so the blob stays recoverable
    /// by a holder of the session key. Fails with
    /// [CryptoError::NoActiveSession] when no session key is live.
    pub fn payment_token(
        &self,
        session_id: &str,
        amount_minor: u64,
        merchant_id: &str,
        rng: &mut impl CryptoRngCore,
    ) -> Result<PaymentToken, CryptoError> {
        let session = self.session_key(session_id)?;

        self.keys.authorize("payment token generation")?;

        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let payload = TokenPayload {
            amount_minor,
            merchant_id: merchant_id.to_string(),
            timestamp_ms: self.keys.now_ms(),
            nonce,
        };
        let payload_bytes = payload.encode();

        let signature = sign(&payload_bytes, &session);

        let token_key = derive(&session, KeyOperation::Payment, &nonce);
        let sealed = aead_seal(&payload_bytes, &token_key, rng);

        let mut token = Vec::with_capacity(NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&sealed);

        Ok(PaymentToken {
            token: BASE64.encode(&token),
            signature: BASE64.encode(signature),
            timestamp_ms: payload.timestamp_ms,
            protocol: ProtocolId::Iso14443a,
        })
    }

    /// Open a sealed payment token and verify its signature
    pub fn open_payment_token(
        &self,
        session_id: &str,
        token: &PaymentToken,
    ) -> Result<TokenPayload, CryptoError> {
        let session = self.session_key(session_id)?;

        let raw = BASE64
            .decode(&token.token)
            .map_err(|_| CryptoError::InvalidEncoding)?;
        if raw.len() < NONCE_LEN {
            return Err(CryptoError::InvalidEncoding);
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);

        let token_key = derive(&session, KeyOperation::Payment, nonce);
        let payload_bytes = aead_open(sealed, &token_key)?;

        let signature = BASE64
            .decode(&token.signature)
            .map_err(|_| CryptoError::InvalidEncoding)?;
        verify(&payload_bytes, &session, &signature)?;

        TokenPayload::decode(&payload_bytes)
    }

    /// Build a wallet-style token for a payment request
    ///
    /// Generates an ephemeral key-agreement pair, masks the PAN to
    /// last-four form, and seals the masked card payload under a key
    /// derived from the master key and the transaction id.
    pub fn wallet_token(
        &self,
        profile: &CardProfile,
        amount_minor: u64,
        merchant_id: &str,
        rng: &mut impl CryptoRngCore,
    ) -> Result<WalletToken, CryptoError> {
        self.keys.authorize("wallet token generation")?;

        let ephemeral = EphemeralSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&ephemeral);

        let mut transaction_id = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut transaction_id);

        let header = WalletTokenHeader {
            ephemeral_public_key: public.to_bytes(),
            public_key_hash: Sha256::digest(public.as_bytes()).into(),
            transaction_id,
        };

        // Masked card records, then the payment fields
        let masked_pan = profile.masked_pan();
        let expiry = profile.expiry().to_string();
        let records = CardRecords {
            pan: &masked_pan,
            expiry: &expiry,
            holder: profile.holder(),
        }
        .encode()
        .map_err(|_| CryptoError::InvalidEncoding)?;

        let mut payload = Vec::with_capacity(records.len() + 16 + merchant_id.len());
        payload.extend_from_slice(&records);

        let mut fixed = [0u8; 16];
        LittleEndian::write_u64(&mut fixed[..8], amount_minor);
        LittleEndian::write_u64(&mut fixed[8..], self.keys.now_ms());
        payload.extend_from_slice(&fixed);
        payload.extend_from_slice(merchant_id.as_bytes());

        let wallet_key = self.derive(KeyOperation::Wallet, &transaction_id);
        let payment_data = aead_seal(&payload, &wallet_key, rng);

        let mut token = [0u8; 32];
        rng.fill_bytes(&mut token);

        Ok(WalletToken {
            token: BASE64.encode(token),
            payment_data,
            header,
        })
    }

    /// Open the sealed payload of a wallet token
    pub fn open_wallet_payment_data(&self, token: &WalletToken) -> Result<Vec<u8>, CryptoError> {
        let wallet_key = self.derive(KeyOperation::Wallet, &token.header.transaction_id);
        aead_open(&token.payment_data, &wallet_key)
    }
}
