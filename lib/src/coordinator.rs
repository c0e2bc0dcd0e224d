// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction lifecycle coordination
//!
//! The [TransactionCoordinator] drives the
//! `Idle → Detecting → Authenticating → Exchanging → Completed | Failed → Idle`
//! lifecycle shared by the card and reader roles, the role only
//! determines which side initiates commands versus which side answers
//! them.
//!
//! Command processing is serialized behind a single mutex so each
//! delivered command runs to completion, transport collaborators may
//! deliver concurrently. State transitions are published on a broadcast
//! channel so callers (UI, tests) subscribe without shared mutable
//! globals.

use rand_core::{CryptoRngCore, OsRng};
use strum::{Display, EnumIter, EnumString};
use tokio::sync::{broadcast, Mutex};

use cardem_apdu::auth::{AuthResponse, CRYPTOGRAM_LEN};
use cardem_apdu::command::commands;
use cardem_apdu::records::CardRecords;
use cardem_apdu::{ApduResponse, CARD_AID};
use cardem_core::clock::{Clock, SystemClock};
use cardem_core::engine::{Engine, Event};
use cardem_core::keystore::{MemoryStorage, SecureStorage};
use cardem_core::profile::{CardProfile, UID_LEN};

use encdec::Decode;

use crate::transport::Exchange;
use crate::Error;

/// Event channel capacity, slow subscribers drop oldest events
const EVENT_CAPACITY: usize = 32;

/// Emulation roles sharing the transaction state machine
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display)]
pub enum Role {
    /// Answer commands as the emulated card
    Card,
    /// Initiate commands as the emulated terminal
    Reader,
}

/// Transaction lifecycle states
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumIter)]
pub enum TransactionState {
    /// No transaction running
    Idle,
    /// Searching for (or announcing to) a counterpart
    Detecting,
    /// Authentication round in progress
    Authenticating,
    /// Exchanging transaction data
    Exchanging,
    /// Transaction completed
    Completed,
    /// Transaction failed
    Failed,
}

/// Completed transaction record
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TransactionSummary {
    /// Card UID (zeroed when never learned)
    pub uid: [u8; UID_LEN],
    /// Amount in minor units (zero for the card role, the terminal
    /// holds the amount)
    pub amount_minor: u64,
    /// Merchant identifier
    pub merchant_id: String,
    /// Start timestamp (milliseconds since the unix epoch)
    pub started_ms: u64,
    /// End timestamp
    pub ended_ms: u64,
    /// Application cryptogram returned for the transaction
    pub cryptogram: Option<[u8; CRYPTOGRAM_LEN]>,
    /// Whether the transaction completed successfully
    pub success: bool,
}

/// Coordinator state change notifications
#[derive(Clone, PartialEq, Debug)]
pub enum TransactionEvent {
    /// Lifecycle state transition
    StateChanged {
        from: TransactionState,
        to: TransactionState,
    },
    /// Counterpart card detected
    TagDetected { uid: [u8; UID_LEN] },
    /// Authentication round completed
    Authenticated,
    /// Transaction finished (successfully or not)
    Completed { summary: TransactionSummary },
}

/// Mutable coordinator state, guarded by a single mutex so command
/// processing is single-flight
struct Inner<S: SecureStorage, C: Clock, RNG: CryptoRngCore> {
    engine: Engine<S, C, RNG>,

    state: TransactionState,
    uid: Option<[u8; UID_LEN]>,
    started_ms: u64,
    amount_minor: u64,
    merchant_id: String,
}

/// Transaction lifecycle coordinator for the card and reader roles
pub struct TransactionCoordinator<
    S: SecureStorage = MemoryStorage,
    C: Clock = SystemClock,
    RNG: CryptoRngCore = OsRng,
> {
    role: Role,
    inner: Mutex<Inner<S, C, RNG>>,
    events: broadcast::Sender<TransactionEvent>,
}

impl<S: SecureStorage, C: Clock, RNG: CryptoRngCore> TransactionCoordinator<S, C, RNG> {
    /// Create a coordinator over the provided engine
    pub fn new(role: Role, engine: Engine<S, C, RNG>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            role,
            inner: Mutex::new(Inner {
                engine,
                state: TransactionState::Idle,
                uid: None,
                started_ms: 0,
                amount_minor: 0,
                merchant_id: String::new(),
            }),
            events,
        }
    }

    /// Coordinator role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Subscribe to transaction state notifications
    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.events.subscribe()
    }

    /// Fetch the current lifecycle state
    pub async fn state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    /// Load a card profile and begin answering as the emulated card
    pub async fn start_emulation(&self, profile: CardProfile) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;

        inner.engine.load_profile(profile)?;

        log::info!(
            "emulating card {:02x?} (ATR {:02x?})",
            inner.engine.profile().map(|p| p.card_uid()),
            cardem_apdu::CARD_ATR
        );

        Ok(())
    }

    /// Stop emulation: release session keys, discard any partially
    /// completed transaction and return to idle
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;

        inner.engine.clear_profile();
        inner.engine.keys_mut().release_all_sessions();

        inner.uid = None;
        inner.amount_minor = 0;
        inner.merchant_id.clear();

        self.set_state(&mut inner, TransactionState::Idle);
    }

    /// Handle a counterpart card detection
    ///
    /// Transitions `Idle / Detecting → Authenticating` and records the
    /// start time, the authentication round then runs over the command
    /// path. Re-detection while a transaction is active is rejected (no
    /// nested transactions).
    pub async fn on_tag_detected(&self, profile: &CardProfile) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        self.detect(&mut inner, Some(profile.card_uid()))
    }

    /// Mark the authentication round complete
    /// (`Authenticating → Exchanging`)
    pub async fn on_authenticated(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        self.authenticated(&mut inner)
    }

    /// Complete the active transaction
    ///
    /// Transitions to `Completed` or `Failed`, records the end time,
    /// clears the active card reference and returns to `Idle`.
    pub async fn complete(&self, success: bool) -> Result<TransactionSummary, Error> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            TransactionState::Authenticating | TransactionState::Exchanging => {
                Ok(self.finish(&mut inner, success, None))
            }
            s => Err(Error::InvalidState(s, TransactionState::Exchanging)),
        }
    }

    /// Process an inbound command buffer as the emulated card,
    /// returning the response buffer
    ///
    /// Commands run to completion behind the coordinator mutex, the
    /// card-side lifecycle advances from the observed command flow.
    pub async fn process_command(&self, command: &[u8]) -> Vec<u8> {
        let mut inner = self.inner.lock().await;

        let evt = Event::parse(command);

        let mut buff = [0u8; cardem_core::engine::RESP_BUFF_LEN];
        let n = inner.engine.handle_apdu(command, &mut buff);
        let resp = buff[..n].to_vec();

        let success = n >= 2 && buff[n - 2..n] == [0x90, 0x00];
        if success {
            self.advance_card_state(&mut inner, &evt, &resp[..resp.len() - 2]);
        }

        resp
    }

    /// Run a purchase against a counterpart card as the terminal
    ///
    /// Drives the select / authenticate / read / cryptogram sequence
    /// over the provided transport, completing (or failing) the
    /// transaction and returning its summary.
    pub async fn run_purchase<T: Exchange>(
        &self,
        transport: &mut T,
        amount_minor: u64,
        merchant_id: &str,
    ) -> Result<TransactionSummary, Error> {
        let mut inner = self.inner.lock().await;

        if inner.state != TransactionState::Idle {
            return Err(Error::TransactionInProgress);
        }

        self.set_state(&mut inner, TransactionState::Detecting);
        inner.amount_minor = amount_minor;
        inner.merchant_id = merchant_id.to_string();

        match self.purchase(&mut inner, transport).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                log::warn!("purchase failed: {e}");
                self.finish(&mut inner, false, None);
                Err(e)
            }
        }
    }

    /// Purchase command sequence, caller handles failure transitions
    async fn purchase<T: Exchange>(
        &self,
        inner: &mut Inner<S, C, RNG>,
        transport: &mut T,
    ) -> Result<TransactionSummary, Error> {
        // Selection answers, the card is present (UID learned once the
        // records are read)
        let select = commands::select(&CARD_AID).build();
        exchange_ok(transport, &select).await?;
        self.detect(inner, None)?;

        // Authentication round: challenge, card authentication, then
        // our device identity over the card challenge
        let get_challenge = commands::get_challenge().build();
        let challenge = exchange_ok(transport, &get_challenge).await?;
        if challenge.len() != 8 {
            return Err(Error::UnexpectedResponse);
        }

        let int_auth = commands::internal_authenticate(&challenge).build();
        let auth_data = exchange_ok(transport, &int_auth).await?;
        let (auth, _) =
            AuthResponse::decode(&auth_data).map_err(|_| Error::AuthenticationFailed)?;

        let device_sig = inner.engine.keys().device_sign(&auth.challenge)?;
        let ext_auth = commands::external_authenticate(&device_sig).build();
        exchange_ok(transport, &ext_auth).await?;

        self.authenticated(inner)?;

        // Data exchange: card records then the application cryptogram
        let read = commands::read_binary().build();
        let records_data = exchange_ok(transport, &read).await?;
        let records =
            CardRecords::decode(&records_data).map_err(|_| Error::UnexpectedResponse)?;

        let uid = CardProfile::new(records.pan, records.expiry, records.holder, "")?.card_uid();
        inner.uid = Some(uid);
        let _ = self.events.send(TransactionEvent::TagDetected { uid });

        let gen_ac = commands::generate_ac(0x80, &challenge).build();
        let ac_data = exchange_ok(transport, &gen_ac).await?;
        let cryptogram: [u8; CRYPTOGRAM_LEN] = ac_data
            .as_slice()
            .try_into()
            .map_err(|_| Error::UnexpectedResponse)?;

        Ok(self.finish(inner, true, Some(cryptogram)))
    }

    /// Advance the card-side lifecycle from an answered command
    fn advance_card_state(&self, inner: &mut Inner<S, C, RNG>, evt: &Event, payload: &[u8]) {
        match (inner.state, evt) {
            // Selection by the terminal is our detection point
            (TransactionState::Idle | TransactionState::Detecting, Event::Select { .. }) => {
                if let Some(uid) = inner.engine.profile().map(|p| p.card_uid()) {
                    let _ = self.detect(inner, Some(uid));
                }
            }

            // First successful authentication completes the round
            (
                TransactionState::Authenticating,
                Event::InternalAuthenticate { .. } | Event::ExternalAuthenticate { .. },
            ) => {
                let _ = self.authenticated(inner);
            }

            // A delivered cryptogram completes the transaction
            (TransactionState::Exchanging, Event::GenerateAc { .. }) => {
                let cryptogram = payload.try_into().ok();
                self.finish(inner, true, cryptogram);
            }

            _ => (),
        }
    }

    /// `Idle / Detecting → Authenticating`, recording the start time
    fn detect(
        &self,
        inner: &mut Inner<S, C, RNG>,
        uid: Option<[u8; UID_LEN]>,
    ) -> Result<(), Error> {
        match inner.state {
            TransactionState::Idle | TransactionState::Detecting => (),
            TransactionState::Authenticating | TransactionState::Exchanging => {
                return Err(Error::TransactionInProgress)
            }
            s => return Err(Error::InvalidState(s, TransactionState::Idle)),
        }

        inner.uid = uid;
        inner.started_ms = inner.engine.keys().now_ms();

        if let Some(uid) = uid {
            let _ = self.events.send(TransactionEvent::TagDetected { uid });
        }
        self.set_state(inner, TransactionState::Authenticating);

        Ok(())
    }

    /// `Authenticating → Exchanging`
    fn authenticated(&self, inner: &mut Inner<S, C, RNG>) -> Result<(), Error> {
        if inner.state != TransactionState::Authenticating {
            return Err(Error::InvalidState(
                inner.state,
                TransactionState::Authenticating,
            ));
        }

        let _ = self.events.send(TransactionEvent::Authenticated);
        self.set_state(inner, TransactionState::Exchanging);

        Ok(())
    }

    /// Transition to `Completed` / `Failed`, publish the summary and
    /// return to `Idle`
    fn finish(
        &self,
        inner: &mut Inner<S, C, RNG>,
        success: bool,
        cryptogram: Option<[u8; CRYPTOGRAM_LEN]>,
    ) -> TransactionSummary {
        let to = match success {
            true => TransactionState::Completed,
            false => TransactionState::Failed,
        };
        self.set_state(inner, to);

        let summary = TransactionSummary {
            uid: inner.uid.take().unwrap_or([0u8; UID_LEN]),
            amount_minor: inner.amount_minor,
            merchant_id: std::mem::take(&mut inner.merchant_id),
            started_ms: inner.started_ms,
            ended_ms: inner.engine.keys().now_ms(),
            cryptogram,
            success,
        };

        let _ = self.events.send(TransactionEvent::Completed {
            summary: summary.clone(),
        });

        inner.amount_minor = 0;
        inner.started_ms = 0;
        self.set_state(inner, TransactionState::Idle);

        summary
    }

    /// Set the lifecycle state, publishing the transition
    fn set_state(&self, inner: &mut Inner<S, C, RNG>, to: TransactionState) {
        if inner.state == to {
            return;
        }

        log::debug!("transaction state {} -> {}", inner.state, to);

        let _ = self.events.send(TransactionEvent::StateChanged {
            from: inner.state,
            to,
        });
        inner.state = to;
    }
}

/// Exchange a command, requiring a success status word and returning
/// the response payload
async fn exchange_ok<T: Exchange>(transport: &mut T, command: &[u8]) -> Result<Vec<u8>, Error> {
    let resp = transport.exchange(command).await?;

    let parsed = ApduResponse::parse(&resp)?;
    if !parsed.is_success() {
        return Err(Error::Status(parsed.status_word()));
    }

    Ok(parsed.data.to_vec())
}
