// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Authentication round tests

use encdec::Decode;
use log::info;

use cardem::transport::Exchange;
use cardem_apdu::auth::AuthResponse;
use cardem_apdu::command::commands;

use crate::{exchange_ok, select};

/// Run a full authentication round: challenge, card authentication
/// response, then terminal-presented authentication
pub async fn test<T: Exchange>(t: &mut T) -> anyhow::Result<()> {
    select(t).await?;

    // Fetch a card challenge
    let apdu = commands::get_challenge().build();
    let challenge = exchange_ok(t, &apdu).await?;
    assert_eq!(challenge.len(), 8, "challenge length");

    // Challenges are fresh per request
    let other = exchange_ok(t, &commands::get_challenge().build()).await?;
    assert_ne!(challenge, other, "repeated challenge");

    // Card authentication response decodes as challenge plus MAC
    let apdu = commands::internal_authenticate(&challenge).build();
    let data = exchange_ok(t, &apdu).await?;

    let (auth, n) = AuthResponse::decode(&data)
        .map_err(|e| anyhow::anyhow!("auth response decode failed: {e:?}"))?;
    assert_eq!(n, data.len(), "trailing auth response bytes");

    info!("card challenge {:02x?}", auth.challenge);

    // Terminal-presented authentication is accepted
    let apdu = commands::external_authenticate(&[0xa5; 16]).build();
    exchange_ok(t, &apdu).await?;

    Ok(())
}
