// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wall clock abstraction
//!
//! Session key expiry compares stored deadlines against a [`Clock`]
//! rather than scheduling timer callbacks, keeping expiry cancellable
//! and controllable under test.

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall clock in milliseconds since the unix epoch
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<T: Clock> Clock for &T {
    fn now_ms(&self) -> u64 {
        T::now_ms(self)
    }
}

/// System wall clock, the default for production use
#[derive(Copy, Clone, Default, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // Pre-epoch system time is a host misconfiguration, saturate
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Clone, Default, Debug)]
pub struct ManualClock {
    now_ms: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock at the provided timestamp
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(now_ms)),
        }
    }

    /// Advance the clock
    pub fn advance_ms(&self, delta: u64) {
        self.now_ms
            .fetch_add(delta, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(std::sync::atomic::Ordering::SeqCst)
    }
}
