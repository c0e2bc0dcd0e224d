// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key management
//!
//! The [KeyStore] exclusively owns all key material: the installation
//! master key, the device signing key, and short-lived per-session
//! key-agreement keys. Dependent components borrow the keystore for the
//! duration of a call and never cache key bytes.
//!
//! Session keys live in an arena with explicit expiry timestamps
//! compared against a [Clock], swept lazily on access and by an explicit
//! [`sweep_sessions`][KeyStore::sweep_sessions] rather than fire-and-forget
//! timer callbacks.

use std::collections::BTreeMap;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::{CryptoRngCore, OsRng};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::{Clock, SystemClock};
use crate::crypto::{self, KeyOperation};

mod storage;
pub use storage::{MemoryStorage, SecureStorage, StorageError};

mod element;
pub use element::{HardwareKeystore, KeyHandle, SecureElement, SoftwareKeystore};

mod error;
pub use error::KeyStoreError;

/// Symmetric key length
pub const KEY_LEN: usize = 32;

/// Session key time-to-live (5 minutes)
pub const SESSION_KEY_TTL_MS: u64 = 5 * 60 * 1000;

/// Storage slot for the persisted master key
pub const MASTER_KEY_ID: &str = "cardem.master-key";

/// Storage slot for the persisted device signing key
pub const DEVICE_KEY_ID: &str = "cardem.device-key";

/// Context string binding the storage wrap key derivation
const STORAGE_CONTEXT: &[u8] = b"cardem.secure-storage";

/// 256-bit symmetric secret, zeroized on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh random key
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        let mut b = [0u8; KEY_LEN];
        rng.fill_bytes(&mut b);
        Self(b)
    }

    /// Construct a key from raw bytes
    pub fn from_bytes(b: [u8; KEY_LEN]) -> Self {
        Self(b)
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for SymmetricKey {
    type Error = KeyStoreError;

    fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
        let b: [u8; KEY_LEN] = b
            .try_into()
            .map_err(|_| KeyStoreError::InvalidKeyMaterial)?;
        Ok(Self(b))
    }
}

/// Redacted debug form, key bytes never reach logs
impl core::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SymmetricKey(..)")
    }
}

bitflags::bitflags! {
    /// Keystore capability flags
    pub struct Capabilities: u8 {
        /// Key material is hardware isolated
        const HARDWARE_BACKED = 1 << 0;
        /// Owner-presence checks are enforced for payment operations
        const USER_PRESENCE = 1 << 1;
    }
}

/// Keystore configuration
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct KeyStoreConfig {
    /// Fail open() when no hardware keystore is available rather than
    /// degrading to software keys
    pub require_hardware: bool,

    /// Require an owner-presence check before payment-sensitive
    /// operations (token generation, session key generation)
    pub user_presence_for_payment: bool,
}

/// Per-session key material with its expiry deadline
struct SessionEntry {
    agreement: StaticSecret,
    symmetric: SymmetricKey,
    expires_at_ms: u64,
}

/// Key lifecycle management
///
/// Generic over the [SecureStorage] backend and [Clock] so platform
/// persistence and test time control plug in without touching key
/// handling.
pub struct KeyStore<S: SecureStorage = MemoryStorage, C: Clock = SystemClock, RNG: CryptoRngCore = OsRng> {
    storage: S,
    element: SecureElement,
    clock: C,
    config: KeyStoreConfig,
    rng: RNG,

    master: SymmetricKey,
    device: SigningKey,
    device_handle: Option<KeyHandle>,

    sessions: BTreeMap<String, SessionEntry>,
}

impl KeyStore {
    /// Open a keystore with in-memory storage and default configuration
    pub fn new() -> Result<Self, KeyStoreError> {
        Self::open(
            MemoryStorage::new(),
            SecureElement::default(),
            SystemClock,
            KeyStoreConfig::default(),
            OsRng,
        )
    }
}

impl<S: SecureStorage, C: Clock, RNG: CryptoRngCore> KeyStore<S, C, RNG> {
    /// Open a keystore over the provided storage backend
    ///
    /// Loads persisted master / device keys or generates and persists
    /// fresh ones if absent, idempotent across restarts.
    pub fn open(
        storage: S,
        mut element: SecureElement,
        clock: C,
        config: KeyStoreConfig,
        mut rng: RNG,
    ) -> Result<Self, KeyStoreError> {
        if config.require_hardware && !element.is_hardware_backed() {
            return Err(KeyStoreError::HardwareUnavailable);
        }

        let mut storage = storage;

        // Master key, persisted raw (the storage backend is the trust
        // boundary for key material slots)
        let master = match storage.get(MASTER_KEY_ID)? {
            Some(b) => SymmetricKey::try_from(&b[..])?,
            None => {
                let k = SymmetricKey::generate(&mut rng);
                storage.put(MASTER_KEY_ID, k.as_bytes())?;
                k
            }
        };

        let wrap = crypto::derive(&master, KeyOperation::Encryption, STORAGE_CONTEXT);

        // Device signing key, sealed under the storage wrap key so it is
        // re-encrypted along with other blobs on rotation
        let device = match storage.get(DEVICE_KEY_ID)? {
            Some(blob) => {
                let mut seed = crypto::aead_open(&blob, &wrap)
                    .map_err(|_| KeyStoreError::InvalidKeyMaterial)?;
                let k = SigningKey::from_bytes(
                    seed.as_slice()
                        .try_into()
                        .map_err(|_| KeyStoreError::InvalidKeyMaterial)?,
                );
                seed.zeroize();
                k
            }
            None => {
                let k = SigningKey::generate(&mut rng);
                let blob = crypto::aead_seal(&k.to_bytes(), &wrap, &mut rng);
                storage.put(DEVICE_KEY_ID, &blob)?;
                k
            }
        };

        // Hardware elements hold their own device identity key
        let device_handle = match element.is_hardware_backed() {
            true => Some(element.generate_key(DEVICE_KEY_ID)?),
            false => None,
        };

        Ok(Self {
            storage,
            element,
            clock,
            config,
            rng,
            master,
            device,
            device_handle,
            sessions: BTreeMap::new(),
        })
    }

    /// Fetch keystore capability flags
    pub fn capabilities(&self) -> Capabilities {
        let mut c = Capabilities::empty();

        if self.element.is_hardware_backed() {
            c |= Capabilities::HARDWARE_BACKED;
        }
        if self.config.user_presence_for_payment {
            c |= Capabilities::USER_PRESENCE;
        }

        c
    }

    /// Borrow the installation master key
    pub fn master_key(&self) -> &SymmetricKey {
        &self.master
    }

    /// Device identity public key
    ///
    /// `None` when the device key is hardware isolated, verification is
    /// then delegated to the platform attestation chain.
    pub fn device_public(&self) -> Option<VerifyingKey> {
        match self.device_handle {
            Some(_) => None,
            None => Some(self.device.verifying_key()),
        }
    }

    /// Sign data with the device identity key
    pub fn device_sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        match &self.device_handle {
            Some(h) => self.element.sign(h, data),
            None => Ok(self.device.sign(data).to_bytes().to_vec()),
        }
    }

    /// Run an owner-presence check where configuration demands one
    pub fn authorize(&self, reason: &str) -> Result<(), KeyStoreError> {
        if !self.config.user_presence_for_payment {
            return Ok(());
        }

        match self.element.authorize_user(reason)? {
            true => Ok(()),
            false => Err(KeyStoreError::AuthorizationDenied),
        }
    }

    /// Current wall clock (milliseconds since the unix epoch)
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Create a session key-agreement pair and its derived symmetric
    /// session key, returning the public half
    ///
    /// The entry expires [SESSION_KEY_TTL_MS] after creation. A second
    /// call with the same id replaces the previous keys and resets the
    /// TTL, distinct ids do not interfere.
    pub fn new_session_key(&mut self, session_id: &str) -> Result<PublicKey, KeyStoreError> {
        self.authorize("session key generation")?;

        // Expired entries are reaped whenever the arena is touched
        self.sweep_sessions();

        let agreement = StaticSecret::random_from_rng(&mut self.rng);
        let public = PublicKey::from(&agreement);

        let symmetric = crypto::derive(
            &self.master,
            KeyOperation::Authentication,
            session_id.as_bytes(),
        );

        self.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                agreement,
                symmetric,
                expires_at_ms: self.clock.now_ms() + SESSION_KEY_TTL_MS,
            },
        );

        Ok(public)
    }

    /// Fetch the symmetric session key for a session id
    ///
    /// Returns `None` for unknown sessions and for entries past their
    /// TTL (an in-flight caller holding a previously returned copy
    /// completes with the key it captured).
    pub fn session_key(&self, session_id: &str) -> Option<SymmetricKey> {
        let e = self.sessions.get(session_id)?;

        if e.expires_at_ms <= self.clock.now_ms() {
            return None;
        }

        Some(e.symmetric.clone())
    }

    /// Complete a key agreement for a session against a peer public key
    pub fn session_shared_secret(
        &self,
        session_id: &str,
        peer: &PublicKey,
    ) -> Result<SymmetricKey, KeyStoreError> {
        let e = self
            .sessions
            .get(session_id)
            .filter(|e| e.expires_at_ms > self.clock.now_ms())
            .ok_or(KeyStoreError::UnknownSession)?;

        Ok(SymmetricKey(e.agreement.diffie_hellman(peer).to_bytes()))
    }

    /// Release a session key ahead of its TTL, no-op if absent
    pub fn release_session_key(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Release every session key (emulation teardown)
    pub fn release_all_sessions(&mut self) {
        self.sessions.clear();
    }

    /// Drop sessions past their TTL, returning the number removed
    pub fn sweep_sessions(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.sessions.len();

        self.sessions.retain(|_, e| e.expires_at_ms > now);

        before - self.sessions.len()
    }

    /// Count of live (unexpired) sessions
    pub fn active_sessions(&self) -> usize {
        let now = self.clock.now_ms();
        self.sessions
            .values()
            .filter(|e| e.expires_at_ms > now)
            .count()
    }

    /// Rotate the master key
    ///
    /// Re-encrypts every sealed storage blob under the new key before
    /// swapping the active key reference. Any re-encryption failure
    /// aborts with no state changed. Session keys derive from the master
    /// and do not survive rotation.
    pub fn rotate_master_key(&mut self) -> Result<(), KeyStoreError> {
        let new_master = SymmetricKey::generate(&mut self.rng);

        let old_wrap = crypto::derive(&self.master, KeyOperation::Encryption, STORAGE_CONTEXT);
        let new_wrap = crypto::derive(&new_master, KeyOperation::Encryption, STORAGE_CONTEXT);

        // Stage every re-encryption before the first write
        let mut staged = Vec::new();
        for key in self.storage.keys()? {
            if key == MASTER_KEY_ID {
                continue;
            }

            let blob = match self.storage.get(&key)? {
                Some(b) => b,
                None => continue,
            };

            let mut plain = crypto::aead_open(&blob, &old_wrap)
                .map_err(|_| KeyStoreError::RotationFailed(format!("unsealing '{key}'")))?;

            staged.push((key, crypto::aead_seal(&plain, &new_wrap, &mut self.rng)));
            plain.zeroize();
        }

        for (key, blob) in &staged {
            self.storage.put(key, blob)?;
        }
        self.storage.put(MASTER_KEY_ID, new_master.as_bytes())?;

        self.master = new_master;
        self.sessions.clear();

        Ok(())
    }

    /// Seal and persist a blob under the provided storage key
    pub fn secure_store(&mut self, key: &str, data: &[u8]) -> Result<(), KeyStoreError> {
        let wrap = crypto::derive(&self.master, KeyOperation::Encryption, STORAGE_CONTEXT);
        let blob = crypto::aead_seal(data, &wrap, &mut self.rng);

        self.storage.put(key, &blob)?;
        Ok(())
    }

    /// Fetch and unseal a blob by storage key
    pub fn secure_retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let blob = match self.storage.get(key)? {
            Some(b) => b,
            None => return Ok(None),
        };

        let wrap = crypto::derive(&self.master, KeyOperation::Encryption, STORAGE_CONTEXT);
        let data = crypto::aead_open(&blob, &wrap).map_err(|_| KeyStoreError::InvalidKeyMaterial)?;

        Ok(Some(data))
    }

    /// Delete a blob by storage key, returning whether one was present
    pub fn secure_delete(&mut self, key: &str) -> Result<bool, KeyStoreError> {
        Ok(self.storage.delete(key)?)
    }

    /// Consume the keystore, returning the storage backend
    /// (for persistence handoff across restarts)
    pub fn into_storage(self) -> S {
        self.storage
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;

    fn open_store(storage: MemoryStorage, clock: ManualClock) -> KeyStore<MemoryStorage, ManualClock> {
        KeyStore::open(
            storage,
            SecureElement::default(),
            clock,
            KeyStoreConfig::default(),
            OsRng,
        )
        .unwrap()
    }

    #[test]
    fn master_and_device_keys_idempotent() {
        let clock = ManualClock::new(0);
        let mut ks = open_store(MemoryStorage::new(), clock.clone());

        let master = ks.master_key().clone();
        let device = ks.device_public().unwrap();

        ks.secure_store("blob", b"payload").unwrap();

        // Reopen over the same storage, keys must match
        let ks2 = open_store(ks.into_storage(), clock);

        assert_eq!(ks2.master_key(), &master);
        assert_eq!(ks2.device_public().unwrap(), device);
        assert_eq!(ks2.secure_retrieve("blob").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn session_key_ttl() {
        let clock = ManualClock::new(1_000);
        let mut ks = open_store(MemoryStorage::new(), clock.clone());

        ks.new_session_key("s1").unwrap();
        assert!(ks.session_key("s1").is_some());
        assert_eq!(ks.active_sessions(), 1);

        // Still live just inside the TTL
        clock.advance_ms(SESSION_KEY_TTL_MS - 1);
        assert!(ks.session_key("s1").is_some());

        // Absent once the TTL elapses
        clock.advance_ms(1);
        assert!(ks.session_key("s1").is_none());
        assert_eq!(ks.active_sessions(), 0);

        // And reaped by an explicit sweep
        assert_eq!(ks.sweep_sessions(), 1);
    }

    #[test]
    fn session_rekey_resets_ttl() {
        let clock = ManualClock::new(0);
        let mut ks = open_store(MemoryStorage::new(), clock.clone());

        let p1 = ks.new_session_key("s1").unwrap();

        clock.advance_ms(SESSION_KEY_TTL_MS / 2);
        let p2 = ks.new_session_key("s1").unwrap();
        assert_ne!(p1.as_bytes(), p2.as_bytes());

        // Original deadline passes, the re-keyed entry survives
        clock.advance_ms(SESSION_KEY_TTL_MS / 2 + 1);
        assert!(ks.session_key("s1").is_some());
    }

    #[test]
    fn sessions_independent() {
        let clock = ManualClock::new(0);
        let mut ks = open_store(MemoryStorage::new(), clock);

        ks.new_session_key("a").unwrap();
        ks.new_session_key("b").unwrap();

        let ka = ks.session_key("a").unwrap();
        let kb = ks.session_key("b").unwrap();
        assert_ne!(ka, kb);

        // Releasing one leaves the other, re-release is a no-op
        ks.release_session_key("a");
        ks.release_session_key("a");
        assert!(ks.session_key("a").is_none());
        assert!(ks.session_key("b").is_some());
    }

    #[test]
    fn shared_secret_agreement() {
        let clock = ManualClock::new(0);
        let mut ks = open_store(MemoryStorage::new(), clock);

        let card_public = ks.new_session_key("s").unwrap();

        // Peer completes the agreement against the published half
        let peer = StaticSecret::random_from_rng(&mut OsRng);
        let peer_public = PublicKey::from(&peer);

        let ours = ks.session_shared_secret("s", &peer_public).unwrap();
        let theirs = peer.diffie_hellman(&card_public);

        assert_eq!(ours.as_bytes(), &theirs.to_bytes());
    }

    #[test]
    fn rotation_preserves_blobs() {
        let clock = ManualClock::new(0);
        let mut ks = open_store(MemoryStorage::new(), clock);

        ks.secure_store("cards", b"card list").unwrap();
        ks.secure_store("settings", b"settings").unwrap();
        ks.new_session_key("s1").unwrap();

        let old_master = ks.master_key().clone();
        let device = ks.device_public().unwrap();

        ks.rotate_master_key().unwrap();

        assert_ne!(ks.master_key(), &old_master);

        // Previously stored blobs still decrypt to the original plaintext
        assert_eq!(ks.secure_retrieve("cards").unwrap(), Some(b"card list".to_vec()));
        assert_eq!(ks.secure_retrieve("settings").unwrap(), Some(b"settings".to_vec()));

        // Device identity survives rotation, session keys do not
        assert_eq!(ks.device_public().unwrap(), device);
        assert!(ks.session_key("s1").is_none());
    }

    #[test]
    fn require_hardware_without_element() {
        let r = KeyStore::open(
            MemoryStorage::new(),
            SecureElement::default(),
            SystemClock,
            KeyStoreConfig {
                require_hardware: true,
                ..Default::default()
            },
            OsRng,
        );

        assert!(matches!(r, Err(KeyStoreError::HardwareUnavailable)));
    }

    #[test]
    fn capabilities_reflect_config() {
        let ks = KeyStore::new().unwrap();
        assert_eq!(ks.capabilities(), Capabilities::empty());

        let ks = KeyStore::open(
            MemoryStorage::new(),
            SecureElement::default(),
            SystemClock,
            KeyStoreConfig {
                user_presence_for_payment: true,
                ..Default::default()
            },
            OsRng,
        )
        .unwrap();
        assert_eq!(ks.capabilities(), Capabilities::USER_PRESENCE);
    }

    #[test]
    fn device_signature_verifies() {
        use ed25519_dalek::{Signature, Verifier};

        let ks = KeyStore::new().unwrap();

        let sig = ks.device_sign(b"challenge").unwrap();
        let sig = Signature::from_slice(&sig).unwrap();

        assert!(ks.device_public().unwrap().verify(b"challenge", &sig).is_ok());
    }

    #[test]
    fn secure_delete_reports_presence() {
        let mut ks = KeyStore::new().unwrap();

        ks.secure_store("k", b"v").unwrap();
        assert!(ks.secure_delete("k").unwrap());
        assert!(!ks.secure_delete("k").unwrap());
        assert_eq!(ks.secure_retrieve("k").unwrap(), None);
    }
}
