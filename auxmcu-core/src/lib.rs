#![cfg_attr(not(feature = "std"), no_std)]

//! # AUX MCU Core
//!
//! USB-to-UART bridge and ASA BUS mode arbitration logic for the auxiliary
//! microcontroller that sits between a USB host and the Main MCU.
//! Hardware access goes through the traits in [`hal`].

#[macro_use]
mod fmt;

pub mod types;
pub mod hal;
pub mod arbitration;
pub mod indicators;
pub mod timer;
pub mod uart;
pub mod exti;
pub mod bridge;
pub mod dispatch;

#[cfg(feature = "test-utils")]
pub mod test_utils;


pub use types::*;
pub use hal::*;
pub use bridge::{CommBridge, GateChange, RxOutcome};
pub use dispatch::{AuxMcu, Interrupt};
pub use indicators::{ActivityIndicators, Indicator};
pub use timer::TickReload;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Board defaults: 38400 baud 8N1, 200 Hz indicator tick
pub fn default_config() -> BridgeConfig {
    BridgeConfig::DEFAULT
}
