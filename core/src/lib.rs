// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Contactless payment card emulation core
//!
//! This provides a common [Engine][engine] interpreting ISO 7816-4 style
//! APDU commands for an emulated payment card, see [cardem_apdu] for wire
//! encodings.
//!
//! Interactions with the [Engine][engine] are performed via
//! [Event][engine::Event]s and [Output][engine::Output]s, with the
//! [`Engine::handle_apdu`][engine::Engine::handle_apdu] entry point
//! mapping raw command buffers to complete response buffers (payload
//! plus status word) for delivery over an arbitrary transport.
//!
//! ## Operations
//!
//! A transaction against the emulated card follows the standard
//! select / authenticate / read / cryptogram sequence:
//!
//! 1. `SELECT` the payment application
//! 2. `GET CHALLENGE` to fetch a random card challenge
//! 3. `INTERNAL AUTHENTICATE` to fetch a challenge / MAC pair under the
//!    session key
//! 4. `READ BINARY` (or `GET DATA`) to fetch the TLV encoded card records
//! 5. `GENERATE AC` to fetch an application cryptogram for the
//!    transaction
//!
//! Key material is exclusively owned by the [KeyStore][keystore::KeyStore],
//! with payment tokens assembled by the [CryptoEngine][crypto::CryptoEngine]
//! which borrows the keystore per call and never caches key bytes.

pub use cardem_apdu as apdu;

pub mod clock;

pub mod crypto;

pub mod engine;

pub mod keystore;

pub mod profile;

pub mod token;
