// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Byte-oriented transport abstraction
//!
//! Transport collaborators (radio advertising / scanning, local
//! wireless hosting, optical codes) expose only
//! `send(bytes) -> response bytes` semantics to the core, framing,
//! discovery and pairing are entirely their concern. The crate ships an
//! [EngineTransport] loopback wiring a local [Engine] as the
//! counterpart, used by the card role and the functional test suite.

use std::sync::Arc;

use async_trait::async_trait;
use rand_core::{CryptoRngCore, OsRng};
use tokio::sync::Mutex;

use cardem_core::clock::{Clock, SystemClock};
use cardem_core::engine::{Engine, RESP_BUFF_LEN};
use cardem_core::keystore::{MemoryStorage, SecureStorage};

use crate::Error;

/// Command / response exchange with a counterpart card or terminal
#[async_trait]
pub trait Exchange: Send {
    /// Deliver a command buffer, returning the complete response buffer
    /// (payload plus status word)
    async fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Loopback transport answering commands with a local [Engine]
///
/// Commands are processed to completion behind a mutex, overlapping
/// in-flight commands against one engine are serialized.
#[derive(Clone)]
pub struct EngineTransport<
    S: SecureStorage = MemoryStorage,
    C: Clock = SystemClock,
    RNG: CryptoRngCore = OsRng,
> {
    engine: Arc<Mutex<Engine<S, C, RNG>>>,
}

impl<S: SecureStorage, C: Clock, RNG: CryptoRngCore> EngineTransport<S, C, RNG> {
    /// Create a loopback transport over the provided engine
    pub fn new(engine: Engine<S, C, RNG>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Fetch a handle to the wrapped engine
    pub fn engine(&self) -> Arc<Mutex<Engine<S, C, RNG>>> {
        self.engine.clone()
    }
}

impl<S: SecureStorage, C: Clock, RNG: CryptoRngCore> From<Engine<S, C, RNG>>
    for EngineTransport<S, C, RNG>
{
    fn from(engine: Engine<S, C, RNG>) -> Self {
        Self::new(engine)
    }
}

#[async_trait]
impl<S, C, RNG> Exchange for EngineTransport<S, C, RNG>
where
    S: SecureStorage + Send,
    C: Clock + Send,
    RNG: CryptoRngCore + Send,
{
    async fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, Error> {
        let mut engine = self.engine.lock().await;

        let mut buff = [0u8; RESP_BUFF_LEN];
        let n = engine.handle_apdu(command, &mut buff);

        Ok(buff[..n].to_vec())
    }
}
