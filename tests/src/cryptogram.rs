// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Application cryptogram tests

use log::info;

use cardem::transport::Exchange;
use cardem_apdu::command::commands;

use crate::{exchange_ok, select};

/// Request application cryptograms, checking shape and counter
/// progression
pub async fn test<T: Exchange>(t: &mut T) -> anyhow::Result<()> {
    select(t).await?;

    let challenge = exchange_ok(t, &commands::get_challenge().build()).await?;

    let apdu = commands::generate_ac(0x80, &challenge).build();
    let first = exchange_ok(t, &apdu).await?;
    assert_eq!(first.len(), 8, "cryptogram length");

    info!("cryptogram {first:02x?}");

    // The transaction counter advances, identical requests yield
    // different cryptograms
    let second = exchange_ok(t, &apdu).await?;
    assert_eq!(second.len(), 8, "cryptogram length");
    assert_ne!(first, second, "repeated cryptogram");

    Ok(())
}
