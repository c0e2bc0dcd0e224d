// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Card record read tests

use log::info;

use cardem::transport::Exchange;
use cardem_apdu::command::commands;
use cardem_apdu::records::CardRecords;
use cardem_core::profile::CardProfile;

use crate::{exchange_ok, select};

/// Select then read the card records, checking the TLV fields against
/// the expected profile
pub async fn test<T: Exchange>(t: &mut T, expected: &CardProfile) -> anyhow::Result<()> {
    select(t).await?;

    // READ BINARY returns the TLV encoded profile fields
    let apdu = commands::read_binary().build();
    let data = exchange_ok(t, &apdu).await?;

    info!("read {} record bytes", data.len());

    let records = CardRecords::decode(&data)
        .map_err(|e| anyhow::anyhow!("record decode failed: {e:?}"))?;

    assert_eq!(records.pan, expected.pan());
    assert_eq!(records.expiry, expected.expiry().to_string());
    assert_eq!(records.holder, expected.holder());

    // GET DATA answers with the same payload
    let apdu = commands::get_data().build();
    let get_data = exchange_ok(t, &apdu).await?;

    assert_eq!(data, get_data, "GET DATA / READ BINARY payload mismatch");

    Ok(())
}
