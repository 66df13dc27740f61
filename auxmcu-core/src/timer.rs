//! Periodic tick service

use crate::hal::{GpioBank, HalError};
use crate::indicators::ActivityIndicators;

/// Register values for a 16-bit prescaler/reload timer (both N-1 encoded)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReload {
    pub prescaler: u16,
    pub reload: u16,
}

impl TickReload {
    /// Tick rate these register values produce from `timer_clock_hz`
    pub fn tick_hz(&self, timer_clock_hz: u32) -> u32 {
        timer_clock_hz / ((self.prescaler as u32 + 1) * (self.reload as u32 + 1))
    }
}

/// Pick the smallest prescaler whose reload fits 16 bits.
///
/// 96 MHz / 200 Hz gives prescaler 8 x reload 60000.
pub fn reload_for(timer_clock_hz: u32, tick_hz: u32) -> Result<TickReload, HalError> {
    if tick_hz == 0 || tick_hz > timer_clock_hz {
        return Err(HalError::InvalidConfig);
    }
    let total = timer_clock_hz / tick_hz;
    let prescaler = total.div_ceil(1 << 16);
    if prescaler > 1 << 16 {
        return Err(HalError::InvalidConfig);
    }
    let reload = total / prescaler;

    Ok(TickReload {
        prescaler: (prescaler - 1) as u16,
        reload: (reload - 1) as u16,
    })
}

/// Tick handler: clear both activity indicators
pub fn on_tick<G: GpioBank>(indicators: &ActivityIndicators, io: &mut G) -> Result<(), G::Error> {
    indicators.clear_all(io)
}
