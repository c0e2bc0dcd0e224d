// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Data write tests
//!
//! Emulated cards acknowledge writes without persistent effect, the
//! records must read back unchanged.

use cardem::transport::Exchange;
use cardem_apdu::command::commands;

use crate::{exchange_ok, exchange_status, select};

/// Write via PUT DATA / UPDATE BINARY then confirm the records are
/// untouched
pub async fn test<T: Exchange>(t: &mut T) -> anyhow::Result<()> {
    select(t).await?;

    let before = exchange_ok(t, &commands::read_binary().build()).await?;

    // Writes acknowledge
    exchange_ok(t, &commands::put_data(&[0xde, 0xad]).build()).await?;
    exchange_ok(t, &commands::update_binary(&[0xbe, 0xef]).build()).await?;

    // No persistent effect
    let after = exchange_ok(t, &commands::read_binary().build()).await?;
    assert_eq!(before, after, "records changed by emulated write");

    // Unknown instructions are rejected with 6982
    let status = exchange_status(t, &[0xFF, 0xFF, 0x00, 0x00]).await?;
    assert_eq!(status, 0x6982, "unknown instruction status");

    Ok(())
}
