//! TX/RX activity indicators
//!
//! Lit by the UART completion interrupts, cleared by the periodic tick.

use portable_atomic::{AtomicBool, Ordering};
use crate::hal::GpioBank;
use crate::types::{Level, Line};

/// Which activity indicator
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    Tx,
    Rx,
}

impl Indicator {
    /// LED line, active low
    pub const fn led(&self) -> Line {
        match self {
            Indicator::Tx => Line::TxLed,
            Indicator::Rx => Line::RxLed,
        }
    }
}

/// Atomic indicator state.
/// Safe to share between interrupt contexts
pub struct ActivityIndicators {
    tx: AtomicBool,
    rx: AtomicBool,
}

impl ActivityIndicators {
    pub const fn new() -> Self {
        Self {
            tx: AtomicBool::new(false),
            rx: AtomicBool::new(false),
        }
    }

    fn flag(&self, indicator: Indicator) -> &AtomicBool {
        match indicator {
            Indicator::Tx => &self.tx,
            Indicator::Rx => &self.rx,
        }
    }

    /// Set the indicator and turn its LED on
    pub fn light<G: GpioBank>(&self, io: &mut G, indicator: Indicator) -> Result<(), G::Error> {
        self.flag(indicator).store(true, Ordering::Relaxed);
        io.write_pin(indicator.led(), Level::Low)
    }

    /// Clear both indicators and turn both LEDs off (tick handler)
    pub fn clear_all<G: GpioBank>(&self, io: &mut G) -> Result<(), G::Error> {
        self.tx.store(false, Ordering::Relaxed);
        self.rx.store(false, Ordering::Relaxed);
        io.write_pin(Line::TxLed, Level::High)?;
        io.write_pin(Line::RxLed, Level::High)
    }

    pub fn is_lit(&self, indicator: Indicator) -> bool {
        self.flag(indicator).load(Ordering::Relaxed)
    }

    pub fn tx(&self) -> bool {
        self.is_lit(Indicator::Tx)
    }

    pub fn rx(&self) -> bool {
        self.is_lit(Indicator::Rx)
    }
}

impl Default for ActivityIndicators {
    fn default() -> Self {
        Self::new()
    }
}
