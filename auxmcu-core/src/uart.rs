//! UART frame constants and baud arithmetic

use crate::hal::HalError;

/// Bit periods per frame on the wire: start + 8 data + stop, no parity
pub const FRAME_BITS: u32 = 10;

/// Divisor for an oversampling-by-16 USART with a fractional BRR
/// (mantissa << 4 | fraction), rounded to nearest.
///
/// 96 MHz at 38400 baud gives 2500.
pub fn baud_divisor(pclk_hz: u32, baud_rate: u32) -> Result<u16, HalError> {
    if baud_rate == 0 {
        return Err(HalError::InvalidConfig);
    }
    let divisor = (pclk_hz + baud_rate / 2) / baud_rate;
    if !(16..=u16::MAX as u32).contains(&divisor) {
        return Err(HalError::InvalidConfig);
    }
    Ok(divisor as u16)
}

/// Relative baud error of `divisor` in parts per thousand
pub fn baud_error_permille(pclk_hz: u32, baud_rate: u32, divisor: u16) -> u32 {
    let actual = pclk_hz / divisor as u32;
    actual.abs_diff(baud_rate) * 1_000 / baud_rate
}
