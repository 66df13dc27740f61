//! CH32V203 Hardware Implementation
//!
//! 64KB Flash / 20KB RAM, 96 MHz from an 8 MHz crystal. Register level,
//! every driver is a zero-sized handle so the foreground loop and the
//! interrupt handlers can each build their own.

use auxmcu_core::hal::{Edge, EdgeInterrupts, EdgeLine, GpioBank, HalError, TickTimer, UartChannel};
use auxmcu_core::types::{Direction, Level, Line};
use auxmcu_core::{timer, uart};
use embedded_hal::delay::DelayNs;

/// System clock after [`init_clocks`]
pub const SYSCLK_HZ: u32 = 96_000_000;
/// APB2 clock (USART1)
pub const PCLK2_HZ: u32 = SYSCLK_HZ;
/// TIM2 kernel clock: APB1 runs at /2, timers get it doubled back
pub const TIM2_CLK_HZ: u32 = SYSCLK_HZ;
/// USBD clock, PLL / 2
pub const USB_CLK_HZ: u32 = SYSCLK_HZ / 2;

const _: () = assert!(USB_CLK_HZ == 48_000_000);

/// RCC_CFGR0 field values
const PLLMUL_X12: u32 = 0xA;
const USBPRE_DIV2: u32 = 0x1;

/// Memory map
const RCC_BASE: u32 = 0x4002_1000;
const FLASH_BASE: u32 = 0x4002_2000;
const GPIOA_BASE: u32 = 0x4001_0800;
const GPIOB_BASE: u32 = 0x4001_0C00;
const AFIO_BASE: u32 = 0x4001_0000;
const EXTI_BASE: u32 = 0x4001_0400;
const USART1_BASE: u32 = 0x4001_3800;
const TIM2_BASE: u32 = 0x4000_0000;
const PFIC_BASE: u32 = 0xE000_E000;

/// RCC register offsets
const RCC_CTLR: u32 = 0x00;
const RCC_CFGR0: u32 = 0x04;
const RCC_APB2PCENR: u32 = 0x18;
const RCC_APB1PCENR: u32 = 0x1C;

/// GPIO register offsets
const GPIO_CFGLR: u32 = 0x00;
const GPIO_CFGHR: u32 = 0x04;
const GPIO_INDR: u32 = 0x08;
const GPIO_BSHR: u32 = 0x10;

/// Pin configuration nibbles (CNF:MODE)
const PIN_INPUT_FLOATING: u32 = 0x4;
const PIN_OUTPUT_PP_50MHZ: u32 = 0x3;
const PIN_AF_PP_50MHZ: u32 = 0xB;

/// AFIO / EXTI register offsets
const AFIO_EXTICR1: u32 = 0x08;
const EXTI_IMR: u32 = 0x00;
const EXTI_RTSR: u32 = 0x08;
const EXTI_FTSR: u32 = 0x0C;
const EXTI_PR: u32 = 0x14;

/// USART register offsets and bits
const USART_STATR: u32 = 0x00;
const USART_DATAR: u32 = 0x04;
const USART_BRR: u32 = 0x08;
const USART_CTLR1: u32 = 0x0C;
const USART_STATR_TXE: u32 = 1 << 7;
const USART_STATR_TC: u32 = 1 << 6;
const USART_STATR_RXNE: u32 = 1 << 5;
const USART_CTLR1_UE: u32 = 1 << 13;
const USART_CTLR1_TCIE: u32 = 1 << 6;
const USART_CTLR1_RXNEIE: u32 = 1 << 5;
const USART_CTLR1_TE: u32 = 1 << 3;
const USART_CTLR1_RE: u32 = 1 << 2;

/// TIM2 register offsets
const TIM_CTLR1: u32 = 0x00;
const TIM_DMAINTENR: u32 = 0x0C;
const TIM_INTFR: u32 = 0x10;
const TIM_PSC: u32 = 0x28;
const TIM_ATRLR: u32 = 0x2C;

/// PFIC interrupt numbers
pub mod irq {
    pub const EXTI0: u32 = 22;
    pub const EXTI1: u32 = 23;
    pub const TIM2: u32 = 44;
    pub const USART1: u32 = 53;
}

#[inline(always)]
fn read(addr: u32) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

#[inline(always)]
fn write(addr: u32, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

#[inline(always)]
fn modify(addr: u32, f: impl FnOnce(u32) -> u32) {
    write(addr, f(read(addr)));
}

/// Physical location of a logical line
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PinRef {
    pub port: u32,
    pub pin: u8,
}

impl PinRef {
    const fn a(pin: u8) -> Self {
        Self { port: GPIOA_BASE, pin }
    }

    const fn b(pin: u8) -> Self {
        Self { port: GPIOB_BASE, pin }
    }

    /// Config register and bit offset of this pin's CNF:MODE nibble
    fn config_slot(&self) -> (u32, u32) {
        if self.pin < 8 {
            (self.port + GPIO_CFGLR, self.pin as u32 * 4)
        } else {
            (self.port + GPIO_CFGHR, (self.pin as u32 - 8) * 4)
        }
    }

    fn set_config(&self, nibble: u32) {
        let (reg, shift) = self.config_slot();
        modify(reg, |cfg| (cfg & !(0xF << shift)) | (nibble << shift));
    }

    fn is_output(&self) -> bool {
        let (reg, shift) = self.config_slot();
        // MODE bits non-zero means output
        (read(reg) >> shift) & 0x3 != 0
    }
}

/// Board wiring
pub mod pins {
    use super::PinRef;
    use auxmcu_core::types::Line;

    pub const fn pin_for(line: Line) -> PinRef {
        match line {
            Line::ResetDetect => PinRef::a(0),
            Line::BusChipSelect => PinRef::a(1),
            Line::ProgRunToMain => PinRef::a(4),
            Line::MasterSlaveToMain => PinRef::a(5),
            Line::ChipSelectToMain => PinRef::a(6),
            Line::UartTx => PinRef::a(9),
            Line::UartRx => PinRef::a(10),
            Line::ProgRunSwitch => PinRef::b(0),
            Line::MasterSlaveSwitch => PinRef::b(1),
            Line::BusAddr0 => PinRef::b(4),
            Line::BusAddr1 => PinRef::b(5),
            Line::BusAddr2 => PinRef::b(6),
            Line::TxLed => PinRef::b(8),
            Line::RxLed => PinRef::b(9),
            Line::KnobBit0 => PinRef::b(12),
            Line::KnobBit1 => PinRef::b(13),
            Line::KnobBit2 => PinRef::b(14),
            Line::KnobBit3 => PinRef::b(15),
        }
    }
}

/// Switch to the 96 MHz PLL and enable the peripheral clocks the bridge uses.
///
/// HSE 8 MHz x12, USB clock PLL/2 = 48 MHz, APB1 /2, flash latency 2.
/// USBPRE only divides by 1, 2 or 3, so SYSCLK must be 48, 96 or 144 MHz.
pub fn init_clocks() -> Result<(), HalError> {
    const SPIN_LIMIT: u32 = 100_000;

    modify(RCC_BASE + RCC_CTLR, |v| v | (1 << 16)); // HSEON
    wait_for(|| read(RCC_BASE + RCC_CTLR) & (1 << 17) != 0, SPIN_LIMIT)?;

    modify(FLASH_BASE, |v| (v & !0x7) | 0x2);

    modify(RCC_BASE + RCC_CFGR0, |v| {
        let v = v & !((0xF << 18) | (0x3 << 22) | (0x7 << 8) | (1 << 16));
        v | (PLLMUL_X12 << 18) | (1 << 16) | (USBPRE_DIV2 << 22) | (0x4 << 8)
    });
    modify(RCC_BASE + RCC_CTLR, |v| v | (1 << 24)); // PLLON
    wait_for(|| read(RCC_BASE + RCC_CTLR) & (1 << 25) != 0, SPIN_LIMIT)?;

    modify(RCC_BASE + RCC_CFGR0, |v| (v & !0x3) | 0x2);
    wait_for(|| (read(RCC_BASE + RCC_CFGR0) >> 2) & 0x3 == 0x2, SPIN_LIMIT)?;

    // AFIO, GPIOA, GPIOB, USART1
    modify(RCC_BASE + RCC_APB2PCENR, |v| v | (1 << 0) | (1 << 2) | (1 << 3) | (1 << 14));
    // TIM2
    modify(RCC_BASE + RCC_APB1PCENR, |v| v | (1 << 0));

    #[cfg(feature = "defmt")]
    defmt::info!("clocks up: {} Hz", SYSCLK_HZ);
    Ok(())
}

fn wait_for(ready: impl Fn() -> bool, limit: u32) -> Result<(), HalError> {
    for _ in 0..limit {
        if ready() {
            return Ok(());
        }
    }
    Err(HalError::NotInitialized)
}

/// Enable one interrupt in the PFIC
pub fn pfic_enable(irq: u32) {
    let ienr = PFIC_BASE + 0x100 + (irq / 32) * 4;
    write(ienr, 1 << (irq % 32));
}

/// Disable one interrupt in the PFIC
pub fn pfic_disable(irq: u32) {
    let irer = PFIC_BASE + 0x180 + (irq / 32) * 4;
    write(irer, 1 << (irq % 32));
}

/// GPIO bank over ports A and B
#[derive(Copy, Clone, Default)]
pub struct Ch32v203Gpio;

impl GpioBank for Ch32v203Gpio {
    type Error = HalError;

    fn read_pin(&mut self, line: Line) -> Result<bool, Self::Error> {
        let pin = pins::pin_for(line);
        Ok(read(pin.port + GPIO_INDR) & (1 << pin.pin) != 0)
    }

    fn write_pin(&mut self, line: Line, level: Level) -> Result<(), Self::Error> {
        let pin = pins::pin_for(line);
        if !pin.is_output() {
            return Err(HalError::GpioError);
        }
        // BSHR: low half sets, high half resets
        let bit = match level {
            Level::High => 1 << pin.pin,
            Level::Low => 1 << (pin.pin + 16),
        };
        write(pin.port + GPIO_BSHR, bit);
        Ok(())
    }

    fn configure_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error> {
        let nibble = match direction {
            Direction::In => PIN_INPUT_FLOATING,
            Direction::Out => PIN_OUTPUT_PP_50MHZ,
        };
        pins::pin_for(line).set_config(nibble);
        Ok(())
    }
}

/// USART1 towards the Main MCU, 8N1
#[derive(Copy, Clone, Default)]
pub struct Ch32v203Uart;

impl Ch32v203Uart {
    fn enabled(&self) -> bool {
        read(USART1_BASE + USART_CTLR1) & USART_CTLR1_UE != 0
    }

    /// Pending interrupt causes, cleared as they are reported
    pub fn take_events(&mut self) -> UartEvents {
        let status = read(USART1_BASE + USART_STATR);
        let ctlr1 = read(USART1_BASE + USART_CTLR1);

        // Reading DATAR clears RXNE
        let received = (status & USART_STATR_RXNE != 0)
            .then(|| read(USART1_BASE + USART_DATAR) as u8);

        let tx_complete = status & USART_STATR_TC != 0 && ctlr1 & USART_CTLR1_TCIE != 0;
        if tx_complete {
            write(USART1_BASE + USART_STATR, !USART_STATR_TC);
        }

        UartEvents { received, tx_complete }
    }
}

/// What raised the USART1 interrupt
#[derive(Copy, Clone, Debug)]
pub struct UartEvents {
    pub received: Option<u8>,
    pub tx_complete: bool,
}

impl UartChannel for Ch32v203Uart {
    type Error = HalError;

    fn initialize(&mut self, baud_rate: u32) -> Result<(), Self::Error> {
        let divisor = uart::baud_divisor(PCLK2_HZ, baud_rate)?;

        pins::pin_for(Line::UartTx).set_config(PIN_AF_PP_50MHZ);
        pins::pin_for(Line::UartRx).set_config(PIN_INPUT_FLOATING);

        // Keep the interrupt enables across a re-initialize
        let irq_bits = read(USART1_BASE + USART_CTLR1) & (USART_CTLR1_RXNEIE | USART_CTLR1_TCIE);
        write(USART1_BASE + USART_CTLR1, 0);
        write(USART1_BASE + USART_BRR, divisor as u32);
        write(
            USART1_BASE + USART_CTLR1,
            USART_CTLR1_UE | USART_CTLR1_TE | USART_CTLR1_RE | irq_bits,
        );
        pfic_enable(irq::USART1);
        Ok(())
    }

    fn deinitialize(&mut self) -> Result<(), Self::Error> {
        write(USART1_BASE + USART_CTLR1, 0);
        pfic_disable(irq::USART1);
        Ok(())
    }

    fn try_transmit(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        if !self.enabled() {
            return Err(nb::Error::Other(HalError::NotInitialized));
        }
        if read(USART1_BASE + USART_STATR) & USART_STATR_TXE == 0 {
            return Err(nb::Error::WouldBlock);
        }
        write(USART1_BASE + USART_DATAR, byte as u32);
        Ok(())
    }

    fn enable_interrupts(&mut self) -> Result<(), Self::Error> {
        modify(USART1_BASE + USART_CTLR1, |v| v | USART_CTLR1_RXNEIE | USART_CTLR1_TCIE);
        Ok(())
    }

    fn disable_interrupts(&mut self) -> Result<(), Self::Error> {
        modify(USART1_BASE + USART_CTLR1, |v| v & !(USART_CTLR1_RXNEIE | USART_CTLR1_TCIE));
        Ok(())
    }
}

/// TIM2 update interrupt as the indicator tick
#[derive(Copy, Clone, Default)]
pub struct Ch32v203Tick;

impl Ch32v203Tick {
    /// Acknowledge the update flag; true if it was set
    pub fn acknowledge(&mut self) -> bool {
        let pending = read(TIM2_BASE + TIM_INTFR) & 1 != 0;
        if pending {
            write(TIM2_BASE + TIM_INTFR, 0);
        }
        pending
    }
}

impl TickTimer for Ch32v203Tick {
    type Error = HalError;

    fn start(&mut self, tick_hz: u32) -> Result<(), Self::Error> {
        let reload = timer::reload_for(TIM2_CLK_HZ, tick_hz)?;

        write(TIM2_BASE + TIM_CTLR1, 0);
        write(TIM2_BASE + TIM_PSC, reload.prescaler as u32);
        write(TIM2_BASE + TIM_ATRLR, reload.reload as u32);
        write(TIM2_BASE + TIM_INTFR, 0);
        write(TIM2_BASE + TIM_DMAINTENR, 1); // UIE
        write(TIM2_BASE + TIM_CTLR1, 1); // CEN
        pfic_enable(irq::TIM2);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        write(TIM2_BASE + TIM_CTLR1, 0);
        write(TIM2_BASE + TIM_DMAINTENR, 0);
        pfic_disable(irq::TIM2);
        Ok(())
    }
}

/// EXTI0 (PA0) and EXTI1 (PA1)
#[derive(Copy, Clone, Default)]
pub struct Ch32v203Edges;

impl Ch32v203Edges {
    const fn exti_line(line: EdgeLine) -> u32 {
        match line {
            EdgeLine::ResetDetect => 0,
            EdgeLine::BusSelect => 1,
        }
    }

    const fn irq(line: EdgeLine) -> u32 {
        match line {
            EdgeLine::ResetDetect => irq::EXTI0,
            EdgeLine::BusSelect => irq::EXTI1,
        }
    }

    /// Clear the pending flag of `line`; true if it was set
    pub fn acknowledge(&mut self, line: EdgeLine) -> bool {
        let mask = 1 << Self::exti_line(line);
        let pending = read(EXTI_BASE + EXTI_PR) & mask != 0;
        if pending {
            // Write 1 to clear
            write(EXTI_BASE + EXTI_PR, mask);
        }
        pending
    }
}

impl EdgeInterrupts for Ch32v203Edges {
    type Error = HalError;

    fn configure_edge(&mut self, line: EdgeLine, edge: Edge) -> Result<(), Self::Error> {
        let n = Self::exti_line(line);
        let mask = 1 << n;

        // Route EXTIn to port A
        modify(AFIO_BASE + AFIO_EXTICR1, |v| v & !(0xF << (n * 4)));
        modify(EXTI_BASE + EXTI_RTSR, |v| if edge.rising() { v | mask } else { v & !mask });
        modify(EXTI_BASE + EXTI_FTSR, |v| if edge.falling() { v | mask } else { v & !mask });
        Ok(())
    }

    fn enable_line(&mut self, line: EdgeLine, enable: bool) -> Result<(), Self::Error> {
        let mask = 1 << Self::exti_line(line);
        if enable {
            write(EXTI_BASE + EXTI_PR, mask);
            modify(EXTI_BASE + EXTI_IMR, |v| v | mask);
            pfic_enable(Self::irq(line));
        } else {
            modify(EXTI_BASE + EXTI_IMR, |v| v & !mask);
            pfic_disable(Self::irq(line));
        }
        Ok(())
    }
}

/// Busy-wait delay calibrated for [`SYSCLK_HZ`]
#[derive(Copy, Clone, Default)]
pub struct CycleDelay;

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        // ~4 cycles per iteration
        let iterations = (ns as u64 * (SYSCLK_HZ / 1_000_000) as u64 / 4_000).max(1);
        for _ in 0..iterations {
            unsafe { riscv::asm::nop() };
        }
    }
}
