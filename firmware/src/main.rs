#![no_std]
#![no_main]

// Logging support
#[cfg(feature = "defmt")]
use defmt::{error, info, warn};
#[cfg(feature = "defmt")]
use defmt_rtt as _;
use panic_halt as _;

// Define simple logging macros when defmt is not available
#[cfg(not(feature = "defmt"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "defmt"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}

use core::cell::RefCell;
use critical_section::Mutex;
use heapless::spsc::Queue;
use riscv_rt::entry;
use static_cell::StaticCell;
use usb_device::bus::UsbBusAllocator;

use auxmcu_core::{AuxMcu, BridgeConfig, EdgeLine, Interrupt};
use auxmcu_firmware::*;

// Critical section implementation for RISC-V
struct RiscvCriticalSection;
critical_section::set_impl!(RiscvCriticalSection);

unsafe impl critical_section::Impl for RiscvCriticalSection {
    unsafe fn acquire() -> critical_section::RawRestoreState {
        let mstatus = riscv::register::mstatus::read();
        riscv::register::mstatus::clear_mie();
        mstatus.mie() as u8
    }

    unsafe fn release(was_enabled: critical_section::RawRestoreState) {
        if was_enabled != 0 {
            riscv::register::mstatus::set_mie();
        }
    }
}

/// Application state shared by the loop and every handler
static APP: AuxMcu = AuxMcu::new(BridgeConfig::DEFAULT);

static USB_BUS: StaticCell<UsbBusAllocator<UsbBusType>> = StaticCell::new();
static UPLINK_QUEUE: StaticCell<Queue<u8, UPLINK_DEPTH>> = StaticCell::new();
static UPLINK: Mutex<RefCell<Option<UplinkProducer>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    if let Err(_e) = init_clocks() {
        error!("clock setup failed: {}", _e);
    }

    let mut io = Ch32v203Gpio;
    let mut uart = Ch32v203Uart;
    if let Err(_e) = APP.bring_up(&mut io, &mut Ch32v203Edges, &mut Ch32v203Tick, &mut CycleDelay) {
        error!("bring-up failed: {}", _e);
    }

    let (producer, consumer) = UPLINK_QUEUE.init(Queue::new()).split();
    critical_section::with(|cs| {
        UPLINK.borrow(cs).replace(Some(UplinkProducer::new(producer)));
    });

    let alloc = USB_BUS.init(bus_allocator());
    let mut usb = match DualCdc::new(alloc, consumer) {
        Ok(usb) => usb,
        Err(_e) => {
            error!("USB setup failed: {}", _e);
            halt()
        }
    };

    info!("AUX MCU v{} up: {}", auxmcu_core::VERSION, APP.mode_state(&mut io).ok());
    unsafe { riscv::register::mstatus::set_mie() };

    loop {
        if let Err(_e) = APP.poll(&mut usb, &mut uart, &mut io) {
            warn!("poll: {}", _e);
        }
    }
}

fn halt() -> ! {
    loop {
        unsafe { riscv::asm::wfi() };
    }
}

fn dispatch(irq: Interrupt) {
    critical_section::with(|cs| {
        if let Some(uplink) = UPLINK.borrow(cs).borrow_mut().as_mut() {
            APP.on_interrupt(irq, &mut Ch32v203Gpio, uplink);
        }
    });
}

// ========================================
// Interrupt Handlers
// ========================================

/// EXTI0: reset button released (rising edge)
#[no_mangle]
extern "C" fn EXTI0_IRQHandler() {
    if Ch32v203Edges.acknowledge(EdgeLine::ResetDetect) {
        dispatch(Interrupt::ResetEdge);
    }
}

/// EXTI1: bus chip-select changed (both edges)
#[no_mangle]
extern "C" fn EXTI1_IRQHandler() {
    if Ch32v203Edges.acknowledge(EdgeLine::BusSelect) {
        dispatch(Interrupt::BusSelectEdge);
    }
}

/// TIM2 update: indicator tick
#[no_mangle]
extern "C" fn TIM2_IRQHandler() {
    if Ch32v203Tick.acknowledge() {
        dispatch(Interrupt::TimerTick);
    }
}

/// USART1: receive complete / transmit complete
#[no_mangle]
extern "C" fn USART1_IRQHandler() {
    let events = Ch32v203Uart.take_events();
    if let Some(byte) = events.received {
        dispatch(Interrupt::UartRx(byte));
    }
    if events.tx_complete {
        dispatch(Interrupt::UartTxComplete);
    }
}
