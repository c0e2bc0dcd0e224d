// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Engine functional tests over the loopback transport

use cardem::transport::EngineTransport;
use cardem_core::engine::Engine;
use cardem_core::keystore::KeyStore;
use cardem_core::profile::CardProfile;

use cardem_tests::{auth, cryptogram, read, write};

fn setup() -> (EngineTransport, CardProfile) {
    let _ = simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        Default::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let profile =
        CardProfile::new("1234567890123456", "12/25", "IVAN IVANOV", "CardemBank").unwrap();

    let mut engine = Engine::new(KeyStore::new().unwrap());
    engine.load_profile(profile.clone()).unwrap();

    (EngineTransport::new(engine), profile)
}

#[tokio::test]
async fn card_read_records() -> anyhow::Result<()> {
    let (mut t, profile) = setup();

    read::test(&mut t, &profile).await
}

#[tokio::test]
async fn card_authenticate() -> anyhow::Result<()> {
    let (mut t, _) = setup();

    auth::test(&mut t).await
}

#[tokio::test]
async fn card_cryptogram() -> anyhow::Result<()> {
    let (mut t, _) = setup();

    cryptogram::test(&mut t).await
}

#[tokio::test]
async fn card_writes_discarded() -> anyhow::Result<()> {
    let (mut t, _) = setup();

    write::test(&mut t).await
}

#[tokio::test]
async fn card_without_profile() -> anyhow::Result<()> {
    use cardem::transport::Exchange;
    use cardem_apdu::command::commands;
    use cardem_apdu::ApduResponse;

    let mut t = EngineTransport::new(Engine::new(KeyStore::new().unwrap()));

    // Reads require a loaded profile
    let resp = t.exchange(&commands::read_binary().build()).await?;
    let parsed = ApduResponse::parse(&resp).unwrap();
    assert_eq!(parsed.status_word(), 0x6A82);

    Ok(())
}
