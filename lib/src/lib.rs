// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Contactless payment emulation library
//!
//! This provides the host-side surface over the
//! [emulation engine][cardem_core]: a byte-oriented [transport]
//! abstraction for the external transport collaborators (radio, local
//! wireless, optical codes), and the [TransactionCoordinator] driving
//! the tag detection / authentication / data exchange / completion
//! lifecycle in both the card and reader roles.
//!

/// Re-export `cardem-apdu` for consumers
pub use cardem_apdu as apdu;

pub mod transport;
pub use transport::{EngineTransport, Exchange};

mod coordinator;
pub use coordinator::{
    Role, TransactionCoordinator, TransactionEvent, TransactionState, TransactionSummary,
};

mod error;
pub use error::Error;
