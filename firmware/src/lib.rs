#![no_std]

//! CH32V203 AUX MCU firmware library: register-level drivers for the
//! [`auxmcu_core`] hardware traits and the dual CDC USB device

pub use auxmcu_core::*;

pub mod ch32v203_hardware;
pub mod usb;

pub use crate::ch32v203_hardware::{
    init_clocks, CycleDelay, Ch32v203Edges, Ch32v203Gpio, Ch32v203Tick, Ch32v203Uart, UartEvents,
};
pub use crate::usb::{bus_allocator, DualCdc, UplinkProducer, UsbBusType, UPLINK_DEPTH};
