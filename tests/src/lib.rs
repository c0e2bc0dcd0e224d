// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Functional tests for payment card emulation.
//!
//! Generic over [cardem::transport::Exchange] for reuse against the
//! engine loopback or a real transport collaborator.
//!

pub mod read;

pub mod auth;

pub mod cryptogram;

pub mod write;

use cardem::transport::Exchange;
use cardem::Error;
use cardem_apdu::command::commands;
use cardem_apdu::{ApduResponse, CARD_AID};

/// Select the payment application, requiring success
pub async fn select<T: Exchange>(t: &mut T) -> anyhow::Result<()> {
    let apdu = commands::select(&CARD_AID).build();
    let resp = exchange_ok(t, &apdu).await?;

    assert!(resp.is_empty(), "SELECT carries no payload");

    Ok(())
}

/// Exchange a command, asserting a success status word and returning
/// the response payload
pub(crate) async fn exchange_ok<T: Exchange>(t: &mut T, apdu: &[u8]) -> anyhow::Result<Vec<u8>> {
    let resp = t.exchange(apdu).await?;

    let parsed = ApduResponse::parse(&resp).map_err(Error::from)?;
    anyhow::ensure!(
        parsed.is_success(),
        "request {:02x?} failed with status {:04X}",
        apdu,
        parsed.status_word()
    );

    Ok(parsed.data.to_vec())
}

/// Exchange a command, returning the bare status word
pub(crate) async fn exchange_status<T: Exchange>(t: &mut T, apdu: &[u8]) -> anyhow::Result<u16> {
    let resp = t.exchange(apdu).await?;

    let parsed = ApduResponse::parse(&resp).map_err(Error::from)?;
    Ok(parsed.status_word())
}
