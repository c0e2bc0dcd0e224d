// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] interprets APDU commands for the emulated payment card.
//!
//! This handles [Event] inputs and returns [Output] responses to the
//! caller, see [apdu][crate::apdu] for wire encoding specifications.
//! The [`handle_apdu`][Engine::handle_apdu] entry point maps raw
//! command buffers to complete response buffers and never fails
//! outward: malformed input and handler failures encode to status
//! words.
//!
//! The engine is stateless across calls apart from the loaded
//! [CardProfile], the active session context, and the application
//! transaction counter, each call is a function of the command and
//! that context.

use byteorder::{ByteOrder, LittleEndian};
use rand_core::{CryptoRngCore, OsRng};

use crate::apdu::auth::CHALLENGE_LEN;
use crate::apdu::{response, StatusWord, CARD_AID};
use crate::clock::{Clock, SystemClock};
use crate::crypto::{CryptoEngine, CryptogramInput};
use crate::keystore::{KeyStore, MemoryStorage, SecureStorage};
use crate::profile::CardProfile;
use crate::token::{PaymentToken, WalletToken};

mod event;
pub use event::Event;

mod output;
pub use output::Output;

mod error;
pub use error::Error;

/// Recommended response buffer length for [`Engine::handle_apdu`]
pub const RESP_BUFF_LEN: usize = 256;

/// APDU interpreter for the emulated payment card
///
/// Generic over the keystore storage / clock and the RNG so platforms
/// and tests can substitute their own, defaulting to in-memory storage,
/// the system clock and [OsRng].
pub struct Engine<S: SecureStorage = MemoryStorage, C: Clock = SystemClock, RNG: CryptoRngCore = OsRng>
{
    keys: KeyStore<S, C, RNG>,

    profile: Option<CardProfile>,
    session_id: Option<String>,

    /// Application transaction counter
    atc: u32,

    /// Challenge issued by the last GET CHALLENGE, bound into the next
    /// cryptogram as the unpredictable number
    last_challenge: Option<[u8; CHALLENGE_LEN]>,

    rng: RNG,
}

impl<S: SecureStorage, C: Clock> Engine<S, C> {
    /// Create a new engine instance over the provided keystore, using
    /// the default [OsRng]
    pub fn new(keys: KeyStore<S, C>) -> Self {
        Self::new_with_rng(keys, OsRng)
    }
}

impl<S: SecureStorage, C: Clock, RNG: CryptoRngCore> Engine<S, C, RNG> {
    /// Create a new engine instance with the provided keystore and rng
    pub fn new_with_rng(keys: KeyStore<S, C, RNG>, rng: RNG) -> Self {
        Self {
            keys,
            profile: None,
            session_id: None,
            atc: 0,
            last_challenge: None,
            rng,
        }
    }

    /// Load a card profile and begin an emulation session
    ///
    /// Creates the session key pair for the profile's card UID, the
    /// profile is immutable until [`clear_profile`][Self::clear_profile].
    pub fn load_profile(&mut self, profile: CardProfile) -> Result<(), Error> {
        let session_id = hex_uid(&profile.card_uid());

        self.keys.new_session_key(&session_id)?;

        log::debug!("profile loaded, session {session_id}");

        self.profile = Some(profile);
        self.session_id = Some(session_id);
        self.atc = 0;
        self.last_challenge = None;

        Ok(())
    }

    /// Clear the loaded profile and release its session key
    pub fn clear_profile(&mut self) {
        if let Some(id) = self.session_id.take() {
            self.keys.release_session_key(&id);
        }

        self.profile = None;
        self.atc = 0;
        self.last_challenge = None;
    }

    /// Fetch the loaded card profile
    pub fn profile(&self) -> Option<&CardProfile> {
        self.profile.as_ref()
    }

    /// Fetch the active session id
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Borrow the keystore
    pub fn keys(&self) -> &KeyStore<S, C, RNG> {
        &self.keys
    }

    /// Mutably borrow the keystore
    pub fn keys_mut(&mut self) -> &mut KeyStore<S, C, RNG> {
        &mut self.keys
    }

    /// Handle an incoming command event
    pub fn update(&mut self, evt: &Event) -> Result<Output, Error> {
        match evt {
            // Acknowledge selection of the payment application
            Event::Select { aid } => {
                if !aid.is_empty() && *aid != CARD_AID {
                    log::debug!("select for foreign AID {aid:02x?}");
                }

                Ok(Output::Ack)
            }

            // Card records, TLV encoded
            Event::ReadBinary | Event::GetData => {
                let profile = self.profile.as_ref().ok_or(Error::ProfileMissing)?;

                let records = profile
                    .encode_records()
                    .map_err(|_| Error::EncodingFailed)?;

                Ok(Output::Records(records))
            }

            // Fresh random challenge
            Event::GetChallenge => {
                let mut challenge = [0u8; CHALLENGE_LEN];
                self.rng.fill_bytes(&mut challenge);

                self.last_challenge = Some(challenge);

                Ok(Output::Challenge(challenge))
            }

            // Emulated: terminal authentication succeeds once a profile
            // is loaded
            Event::ExternalAuthenticate { .. } => {
                if self.profile.is_none() {
                    return Err(Error::ProfileMissing);
                }

                Ok(Output::Ack)
            }

            // Challenge / MAC pair under the session key
            Event::InternalAuthenticate { .. } => {
                let session_id = self.session_id.as_deref().ok_or(Error::NoActiveSession)?;

                let resp =
                    CryptoEngine::new(&self.keys).auth_response(session_id, &mut self.rng)?;

                Ok(Output::Auth(resp))
            }

            // Application cryptogram over counter / challenge / date / type
            Event::GenerateAc { reference, data } => {
                let session_id = self.session_id.as_deref().ok_or(Error::NoActiveSession)?;

                self.atc = self.atc.wrapping_add(1);

                // Unpredictable number: terminal-supplied when present,
                // otherwise the last issued challenge, otherwise fresh
                let mut unpredictable = [0u8; CHALLENGE_LEN];
                if data.len() >= CHALLENGE_LEN {
                    unpredictable.copy_from_slice(&data[..CHALLENGE_LEN]);
                } else if let Some(c) = self.last_challenge {
                    unpredictable = c;
                } else {
                    self.rng.fill_bytes(&mut unpredictable);
                }

                let input = CryptogramInput {
                    counter: self.atc,
                    unpredictable,
                    date: date_bytes(self.keys.now_ms()),
                    tx_type: [*reference, 0x00, 0x00],
                };

                let cryptogram =
                    CryptoEngine::new(&self.keys).application_cryptogram(session_id, &input)?;

                Ok(Output::Cryptogram(crate::apdu::auth::CryptogramResp {
                    cryptogram,
                }))
            }

            // Acknowledge writes, emulated cards have no persistent files
            Event::PutData { data } | Event::UpdateBinary { data } => {
                log::debug!("discarding {} byte write", data.len());
                Ok(Output::Ack)
            }

            // Reject unknown / malformed commands
            Event::Unknown => Err(Error::CommandNotAllowed),
        }
    }

    /// Handle a raw command buffer, encoding the response (payload plus
    /// status word) into `buff` and returning the response length
    ///
    /// Never fails outward: parse errors and handler failures map to
    /// their status words. `buff` should hold at least
    /// [`RESP_BUFF_LEN`] bytes.
    pub fn handle_apdu(&mut self, req: &[u8], buff: &mut [u8]) -> usize {
        let evt = Event::parse(req);

        log::debug!("event: {evt:02x?}");

        let r = match self.update(&evt) {
            Ok(out) => out.encode(buff),
            Err(e) => {
                log::debug!("command rejected: {e}");
                response::write_status(buff, e.status_word())
            }
        };

        match r {
            Ok(n) => n,
            // Undersized response buffer, last-resort bare status
            Err(_) => response::write_status(buff, StatusWord::CommandNotAllowed).unwrap_or(0),
        }
    }

    /// Current application transaction counter
    pub fn atc(&self) -> u32 {
        self.atc
    }

    /// Build a sealed payment token for the active session
    pub fn payment_token(
        &mut self,
        amount_minor: u64,
        merchant_id: &str,
    ) -> Result<PaymentToken, Error> {
        let session_id = self.session_id.as_deref().ok_or(Error::NoActiveSession)?;

        let token = CryptoEngine::new(&self.keys).payment_token(
            session_id,
            amount_minor,
            merchant_id,
            &mut self.rng,
        )?;

        Ok(token)
    }

    /// Build a wallet-style token for the loaded profile
    pub fn wallet_token(
        &mut self,
        amount_minor: u64,
        merchant_id: &str,
    ) -> Result<WalletToken, Error> {
        let profile = self.profile.as_ref().ok_or(Error::ProfileMissing)?;

        let token = CryptoEngine::new(&self.keys).wallet_token(
            profile,
            amount_minor,
            merchant_id,
            &mut self.rng,
        )?;

        Ok(token)
    }
}

/// Session id form of a card UID
fn hex_uid(uid: &[u8]) -> String {
    uid.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cryptogram date bytes: day index since the unix epoch, little endian
fn date_bytes(now_ms: u64) -> [u8; 6] {
    let days = (now_ms / 86_400_000) as u32;

    let mut b = [0u8; 6];
    LittleEndian::write_u32(&mut b[..4], days);
    b
}
