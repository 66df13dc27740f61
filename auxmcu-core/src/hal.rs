//! Hardware Abstraction Layer for the AUX MCU bridge

use embedded_hal::digital::{InputPin, OutputPin};
use crate::types::{ChannelId, ControlLines, Direction, Level, Line};

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// UART operation failed
    UartError,
    /// USB endpoint operation failed
    UsbError,
    /// Hardware not initialized
    NotInitialized,
    /// Invalid configuration
    InvalidConfig,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::UartError => write!(f, "UART operation failed"),
            HalError::UsbError => write!(f, "USB endpoint operation failed"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
            HalError::InvalidConfig => write!(f, "Invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Discrete GPIO access by logical line
pub trait GpioBank {
    type Error: From<HalError>;

    /// Sample the current level of a line
    fn read_pin(&mut self, line: Line) -> Result<bool, Self::Error>;

    /// Drive a line
    fn write_pin(&mut self, line: Line, level: Level) -> Result<(), Self::Error>;

    /// Switch a line between input (high impedance) and push-pull output
    fn configure_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error>;
}

/// Byte-oriented link to the Main MCU, fixed 8N1 frame
pub trait UartChannel {
    type Error: From<HalError>;

    /// Configure baud rate and frame, enable receiver and transmitter.
    /// Calling it again with the same rate has no further effect.
    fn initialize(&mut self, baud_rate: u32) -> Result<(), Self::Error>;

    /// Disable the channel entirely
    fn deinitialize(&mut self) -> Result<(), Self::Error>;

    /// Write one byte if the transmit buffer is empty
    fn try_transmit(&mut self, byte: u8) -> nb::Result<(), Self::Error>;

    /// Spin until the transmit buffer is empty, then write.
    /// Bounded by one byte time at the configured baud rate.
    fn transmit_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        nb::block!(self.try_transmit(byte))
    }

    /// Raise receive-complete and transmit-complete notifications
    fn enable_interrupts(&mut self) -> Result<(), Self::Error>;

    /// Stop receive-complete and transmit-complete notifications
    fn disable_interrupts(&mut self) -> Result<(), Self::Error>;
}

/// Periodic tick source
pub trait TickTimer {
    type Error: From<HalError>;

    /// Start firing the tick interrupt at `tick_hz`
    fn start(&mut self, tick_hz: u32) -> Result<(), Self::Error>;

    /// Stop the tick interrupt
    fn stop(&mut self) -> Result<(), Self::Error>;
}

/// External edge-triggered interrupt lines
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgeLine {
    /// Line A: reset button / program detect
    ResetDetect,
    /// Line B: ASA BUS chip-select / mode change
    BusSelect,
}

/// Edge sensitivity of an external interrupt line
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    pub const fn rising(&self) -> bool {
        matches!(self, Edge::Rising | Edge::Both)
    }

    pub const fn falling(&self) -> bool {
        matches!(self, Edge::Falling | Edge::Both)
    }
}

/// Trait for external interrupt configuration
pub trait EdgeInterrupts {
    type Error: From<HalError>;

    /// Select the edges that trigger `line`
    fn configure_edge(&mut self, line: EdgeLine, edge: Edge) -> Result<(), Self::Error>;

    /// Enable/disable the interrupt of `line`
    fn enable_line(&mut self, line: EdgeLine, enable: bool) -> Result<(), Self::Error>;
}

/// USB host link lifecycle
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    HostConnect,
    HostDisconnect,
}

/// USB device state as seen by the link tracker
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    /// Not yet configured by the host (default or addressed)
    Unconfigured,
    Configured,
    Suspended,
}

/// Turns device-state samples into connect/disconnect events.
///
/// Suspend keeps the current link state; resume returns to it.
#[derive(Default)]
pub struct LinkTracker {
    up: bool,
}

impl LinkTracker {
    pub const fn new() -> Self {
        Self { up: false }
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn update(&mut self, state: BusState) -> Option<LinkEvent> {
        let up = match state {
            BusState::Configured => true,
            BusState::Suspended => self.up,
            BusState::Unconfigured => false,
        };
        if up == self.up {
            return None;
        }
        self.up = up;
        Some(if up { LinkEvent::HostConnect } else { LinkEvent::HostDisconnect })
    }
}

/// Host-to-device control-line change on one channel
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlChange {
    pub channel: ChannelId,
    pub lines: ControlLines,
}

/// Device-to-host byte path, usable from interrupt context
pub trait UsbUplink {
    type Error: From<HalError>;

    /// Queue one byte towards the host; buffered, never blocks
    fn send_byte(&mut self, channel: ChannelId, byte: u8) -> Result<(), Self::Error>;
}

/// USB CDC serial endpoint with two logical channels
pub trait UsbSerialEndpoint: UsbUplink {
    /// Non-blocking poll for one byte from the host
    fn receive_byte(&mut self, channel: ChannelId) -> Option<u8>;

    /// Drive USB housekeeping for `channel`; call every loop iteration
    fn service_task(&mut self, channel: ChannelId) -> Result<(), Self::Error>;

    /// Current host-to-device control-line state of `channel`
    fn control_lines(&self, channel: ChannelId) -> ControlLines;

    /// Pending host connect/disconnect notification, if any
    fn take_link_event(&mut self) -> Option<LinkEvent>;

    /// Oldest control-line change not yet taken. Every transition the host
    /// makes is reported, even when several land between two polls.
    fn take_control_change(&mut self) -> Option<ControlChange>;
}

/// Generic [`GpioBank`] over one embedded-hal pin per logical line.
///
/// Directions are only recorded; the pins are expected to be flexible
/// (input and output capable) and already set up by the board HAL.
pub struct EmbeddedHalGpio<P> {
    pins: [P; Line::COUNT],
    directions: [Direction; Line::COUNT],
}

impl<P> EmbeddedHalGpio<P>
where
    P: InputPin + OutputPin,
{
    /// `pins` must be ordered like [`Line::ALL`]
    pub fn new(pins: [P; Line::COUNT]) -> Self {
        let mut directions = [Direction::In; Line::COUNT];
        for line in Line::ALL {
            directions[line.index()] = line.boot_direction();
        }
        Self { pins, directions }
    }

    pub fn direction(&self, line: Line) -> Direction {
        self.directions[line.index()]
    }

    pub fn release(self) -> [P; Line::COUNT] {
        self.pins
    }
}

impl<P> GpioBank for EmbeddedHalGpio<P>
where
    P: InputPin + OutputPin,
{
    type Error = HalError;

    fn read_pin(&mut self, line: Line) -> Result<bool, Self::Error> {
        self.pins[line.index()].is_high().map_err(|_| HalError::GpioError)
    }

    fn write_pin(&mut self, line: Line, level: Level) -> Result<(), Self::Error> {
        if self.directions[line.index()] != Direction::Out {
            return Err(HalError::GpioError);
        }
        let pin = &mut self.pins[line.index()];
        let result = match level {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        };
        result.map_err(|_| HalError::GpioError)
    }

    fn configure_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error> {
        self.directions[line.index()] = direction;
        Ok(())
    }
}

/// Sample consecutive lines into an unsigned value, first line is bit 0
pub fn sample_bits<G: GpioBank>(io: &mut G, lines: &[Line]) -> Result<u8, G::Error> {
    let mut value = 0u8;
    for (bit, line) in lines.iter().enumerate() {
        if io.read_pin(*line)? {
            value |= 1 << bit;
        }
    }
    Ok(value)
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use core::cell::{Cell, RefCell};
    use embedded_hal::delay::DelayNs;
    use heapless::{Deque, Vec};

    /// Simulated GPIO bank recording every output write
    pub struct MockGpio {
        levels: RefCell<[bool; Line::COUNT]>,
        directions: RefCell<[Direction; Line::COUNT]>,
        writes: RefCell<Vec<(Line, Level), 1024>>,
    }

    impl Default for MockGpio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockGpio {
        pub fn new() -> Self {
            Self {
                levels: RefCell::new([false; Line::COUNT]),
                directions: RefCell::new([Direction::In; Line::COUNT]),
                writes: RefCell::new(Vec::new()),
            }
        }

        /// Set the level seen on an input line
        pub fn set_input(&self, line: Line, high: bool) {
            self.levels.borrow_mut()[line.index()] = high;
        }

        /// Put a value on consecutive lines, first line is bit 0
        pub fn set_bits(&self, lines: &[Line], value: u8) {
            for (bit, line) in lines.iter().enumerate() {
                self.set_input(*line, value & (1 << bit) != 0);
            }
        }

        pub fn level(&self, line: Line) -> bool {
            self.levels.borrow()[line.index()]
        }

        pub fn direction(&self, line: Line) -> Direction {
            self.directions.borrow()[line.index()]
        }

        /// Output writes in the order they happened
        pub fn writes(&self) -> Vec<(Line, Level), 1024> {
            self.writes.borrow().clone()
        }

        /// Output writes to a single line, oldest first
        pub fn writes_to(&self, line: Line) -> Vec<Level, 1024> {
            self.writes
                .borrow()
                .iter()
                .filter(|(l, _)| *l == line)
                .map(|(_, level)| *level)
                .collect()
        }

        pub fn clear_writes(&self) {
            self.writes.borrow_mut().clear();
        }
    }

    impl GpioBank for MockGpio {
        type Error = HalError;

        fn read_pin(&mut self, line: Line) -> Result<bool, Self::Error> {
            Ok(self.level(line))
        }

        fn write_pin(&mut self, line: Line, level: Level) -> Result<(), Self::Error> {
            if self.direction(line) != Direction::Out {
                return Err(HalError::GpioError);
            }
            self.levels.borrow_mut()[line.index()] = level.into();
            self.writes
                .borrow_mut()
                .push((line, level))
                .map_err(|_| HalError::GpioError)
        }

        fn configure_direction(&mut self, line: Line, direction: Direction) -> Result<(), Self::Error> {
            self.directions.borrow_mut()[line.index()] = direction;
            Ok(())
        }
    }

    /// Simulated UART channel
    #[derive(Default)]
    pub struct MockUart {
        baud_rate: Cell<Option<u32>>,
        interrupts: Cell<bool>,
        busy_polls: Cell<u32>,
        pending_polls: Cell<u32>,
        spins: Cell<u32>,
        sent: RefCell<Vec<u8, 256>>,
    }

    impl MockUart {
        pub fn new() -> Self {
            Self::default()
        }

        /// Report a full transmit buffer for the next `polls` attempts of
        /// every byte
        pub fn set_busy_polls(&self, polls: u32) {
            self.busy_polls.set(polls);
            self.pending_polls.set(polls);
        }

        pub fn baud_rate(&self) -> Option<u32> {
            self.baud_rate.get()
        }

        pub fn is_initialized(&self) -> bool {
            self.baud_rate.get().is_some()
        }

        pub fn interrupts_enabled(&self) -> bool {
            self.interrupts.get()
        }

        /// Bytes written to the wire
        pub fn sent(&self) -> Vec<u8, 256> {
            self.sent.borrow().clone()
        }

        /// Number of WouldBlock answers handed out so far
        pub fn spins(&self) -> u32 {
            self.spins.get()
        }
    }

    impl UartChannel for MockUart {
        type Error = HalError;

        fn initialize(&mut self, baud_rate: u32) -> Result<(), Self::Error> {
            self.baud_rate.set(Some(baud_rate));
            Ok(())
        }

        fn deinitialize(&mut self) -> Result<(), Self::Error> {
            self.baud_rate.set(None);
            Ok(())
        }

        fn try_transmit(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
            if !self.is_initialized() {
                return Err(nb::Error::Other(HalError::NotInitialized));
            }
            let pending = self.pending_polls.get();
            if pending > 0 {
                self.pending_polls.set(pending - 1);
                self.spins.set(self.spins.get() + 1);
                return Err(nb::Error::WouldBlock);
            }
            self.pending_polls.set(self.busy_polls.get());
            self.sent
                .borrow_mut()
                .push(byte)
                .map_err(|_| nb::Error::Other(HalError::UartError))
        }

        fn enable_interrupts(&mut self) -> Result<(), Self::Error> {
            self.interrupts.set(true);
            Ok(())
        }

        fn disable_interrupts(&mut self) -> Result<(), Self::Error> {
            self.interrupts.set(false);
            Ok(())
        }
    }

    /// Simulated tick timer
    #[derive(Default)]
    pub struct MockTimer {
        tick_hz: Cell<Option<u32>>,
    }

    impl MockTimer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn tick_hz(&self) -> Option<u32> {
            self.tick_hz.get()
        }
    }

    impl TickTimer for MockTimer {
        type Error = HalError;

        fn start(&mut self, tick_hz: u32) -> Result<(), Self::Error> {
            if tick_hz == 0 {
                return Err(HalError::InvalidConfig);
            }
            self.tick_hz.set(Some(tick_hz));
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Self::Error> {
            self.tick_hz.set(None);
            Ok(())
        }
    }

    /// Simulated external interrupt controller
    #[derive(Default)]
    pub struct MockEdges {
        edges: Cell<[Option<Edge>; 2]>,
        enabled: Cell<[bool; 2]>,
    }

    impl MockEdges {
        pub fn new() -> Self {
            Self::default()
        }

        fn slot(line: EdgeLine) -> usize {
            match line {
                EdgeLine::ResetDetect => 0,
                EdgeLine::BusSelect => 1,
            }
        }

        pub fn edge(&self, line: EdgeLine) -> Option<Edge> {
            self.edges.get()[Self::slot(line)]
        }

        pub fn is_enabled(&self, line: EdgeLine) -> bool {
            self.enabled.get()[Self::slot(line)]
        }
    }

    impl EdgeInterrupts for MockEdges {
        type Error = HalError;

        fn configure_edge(&mut self, line: EdgeLine, edge: Edge) -> Result<(), Self::Error> {
            let mut edges = self.edges.get();
            edges[Self::slot(line)] = Some(edge);
            self.edges.set(edges);
            Ok(())
        }

        fn enable_line(&mut self, line: EdgeLine, enable: bool) -> Result<(), Self::Error> {
            let mut enabled = self.enabled.get();
            enabled[Self::slot(line)] = enable;
            self.enabled.set(enabled);
            Ok(())
        }
    }

    /// Simulated dual-channel USB CDC endpoint
    #[derive(Default)]
    pub struct MockUsbSerial {
        inbound: RefCell<[Deque<u8, 64>; 2]>,
        outbound: RefCell<[Vec<u8, 256>; 2]>,
        lines: Cell<[ControlLines; 2]>,
        link_events: RefCell<Deque<LinkEvent, 4>>,
        control_changes: RefCell<Deque<ControlChange, 16>>,
        service_calls: Cell<[u32; 2]>,
    }

    impl MockUsbSerial {
        pub fn new() -> Self {
            Self::default()
        }

        /// Bytes the host sends on `channel`
        pub fn host_write(&self, channel: ChannelId, bytes: &[u8]) {
            let mut inbound = self.inbound.borrow_mut();
            for byte in bytes {
                inbound[channel.index()].push_back(*byte).ok();
            }
        }

        /// Bytes queued towards the host on `channel`
        pub fn host_read(&self, channel: ChannelId) -> Vec<u8, 256> {
            self.outbound.borrow()[channel.index()].clone()
        }

        pub fn pending_inbound(&self, channel: ChannelId) -> usize {
            self.inbound.borrow()[channel.index()].len()
        }

        /// Host sets the lines of `channel`; a change is queued when they differ
        pub fn set_control_lines(&self, channel: ChannelId, lines: ControlLines) {
            let mut all = self.lines.get();
            if all[channel.index()] == lines {
                return;
            }
            all[channel.index()] = lines;
            self.lines.set(all);
            self.control_changes
                .borrow_mut()
                .push_back(ControlChange { channel, lines })
                .ok();
        }

        pub fn pending_control_changes(&self) -> usize {
            self.control_changes.borrow().len()
        }

        pub fn push_link_event(&self, event: LinkEvent) {
            self.link_events.borrow_mut().push_back(event).ok();
        }

        pub fn service_calls(&self, channel: ChannelId) -> u32 {
            self.service_calls.get()[channel.index()]
        }
    }

    impl UsbUplink for MockUsbSerial {
        type Error = HalError;

        fn send_byte(&mut self, channel: ChannelId, byte: u8) -> Result<(), Self::Error> {
            self.outbound.borrow_mut()[channel.index()]
                .push(byte)
                .map_err(|_| HalError::UsbError)
        }
    }

    impl UsbSerialEndpoint for MockUsbSerial {
        fn receive_byte(&mut self, channel: ChannelId) -> Option<u8> {
            self.inbound.borrow_mut()[channel.index()].pop_front()
        }

        fn service_task(&mut self, channel: ChannelId) -> Result<(), Self::Error> {
            let mut calls = self.service_calls.get();
            calls[channel.index()] += 1;
            self.service_calls.set(calls);
            Ok(())
        }

        fn control_lines(&self, channel: ChannelId) -> ControlLines {
            self.lines.get()[channel.index()]
        }

        fn take_link_event(&mut self) -> Option<LinkEvent> {
            self.link_events.borrow_mut().pop_front()
        }

        fn take_control_change(&mut self) -> Option<ControlChange> {
            self.control_changes.borrow_mut().pop_front()
        }
    }

    /// Delay that only accumulates the requested time
    #[derive(Default)]
    pub struct MockDelay {
        elapsed_ns: u64,
    }

    impl MockDelay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn elapsed_ns(&self) -> u64 {
            self.elapsed_ns
        }
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.elapsed_ns += ns as u64;
        }
    }
}
