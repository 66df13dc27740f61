//! Simulated board for host-side tests

use crate::dispatch::{AuxMcu, Interrupt};
use crate::hal::mock::{MockDelay, MockEdges, MockGpio, MockTimer, MockUart, MockUsbSerial};
use crate::hal::{HalError, LinkEvent};
use crate::types::{BridgeConfig, ChannelId, ControlLines, Line, ModeState, Role, RunMode};

/// External stimulus on the switch/bus side of the board
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SwitchEvent {
    /// Prog/Run switch moved, then reset button released
    ProgRun(RunMode),
    /// M/S switch moved, then the bus select line toggled
    MasterSlave(Role),
    /// New bus address presented with a chip-select edge
    BusAddress(u8),
    /// Knob turned (no interrupt)
    Knob(u8),
}

/// All mocks of one AUX MCU plus the application under test
pub struct SimBoard {
    pub app: AuxMcu,
    pub io: MockGpio,
    pub uart: MockUart,
    pub usb: MockUsbSerial,
    pub timer: MockTimer,
    pub edges: MockEdges,
    pub delay: MockDelay,
}

impl SimBoard {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            app: AuxMcu::new(config),
            io: MockGpio::new(),
            uart: MockUart::new(),
            usb: MockUsbSerial::new(),
            timer: MockTimer::new(),
            edges: MockEdges::new(),
            delay: MockDelay::new(),
        }
    }

    /// Board with default configuration, already brought up
    pub fn booted() -> Result<Self, HalError> {
        let mut board = Self::new(BridgeConfig::DEFAULT);
        board.bring_up()?;
        Ok(board)
    }

    pub fn bring_up(&mut self) -> Result<(), HalError> {
        self.app
            .bring_up(&mut self.io, &mut self.edges, &mut self.timer, &mut self.delay)
    }

    /// Position both mode switches without raising interrupts
    pub fn set_switches(&self, mode: ModeState) {
        self.io.set_input(Line::ProgRunSwitch, mode.run_mode.level());
        self.io.set_input(Line::MasterSlaveSwitch, mode.role.level());
    }

    /// Present a bus address and a knob position without raising interrupts
    pub fn set_address(&self, bus: u8, knob: u8) {
        self.io.set_bits(&Line::BUS_ADDR, bus);
        self.io.set_bits(&Line::KNOB, knob);
    }

    pub fn interrupt(&mut self, irq: Interrupt) {
        self.app.on_interrupt(irq, &mut self.io, &mut self.usb);
    }

    /// Apply a stimulus and fire the interrupt it causes, if any
    pub fn apply(&mut self, event: SwitchEvent) {
        match event {
            SwitchEvent::ProgRun(mode) => {
                self.io.set_input(Line::ProgRunSwitch, mode.level());
                self.interrupt(Interrupt::ResetEdge);
            }
            SwitchEvent::MasterSlave(role) => {
                self.io.set_input(Line::MasterSlaveSwitch, role.level());
                self.interrupt(Interrupt::BusSelectEdge);
            }
            SwitchEvent::BusAddress(bus) => {
                self.io.set_bits(&Line::BUS_ADDR, bus);
                self.interrupt(Interrupt::BusSelectEdge);
            }
            SwitchEvent::Knob(knob) => self.io.set_bits(&Line::KNOB, knob),
        }
    }

    /// Host opens the port with the given control lines on the data channel
    pub fn host_connect(&mut self, lines: ControlLines) -> Result<(), HalError> {
        self.usb.push_link_event(LinkEvent::HostConnect);
        self.usb.set_control_lines(ChannelId::Data, lines);
        self.poll()
    }

    pub fn host_disconnect(&mut self) -> Result<(), HalError> {
        self.usb.push_link_event(LinkEvent::HostDisconnect);
        self.usb.set_control_lines(ChannelId::Data, ControlLines::default());
        self.usb.set_control_lines(ChannelId::Control, ControlLines::default());
        self.poll()
    }

    pub fn set_control_lines(&mut self, channel: ChannelId, lines: ControlLines) -> Result<(), HalError> {
        self.usb.set_control_lines(channel, lines);
        self.poll()
    }

    pub fn poll(&mut self) -> Result<(), HalError> {
        self.app.poll(&mut self.usb, &mut self.uart, &mut self.io)
    }

    /// Host writes `bytes` on the data channel; poll until they are consumed
    pub fn host_send(&mut self, bytes: &[u8]) -> Result<(), HalError> {
        self.usb.host_write(ChannelId::Data, bytes);
        while self.usb.pending_inbound(ChannelId::Data) > 0 {
            self.poll()?;
        }
        Ok(())
    }

    /// Main MCU sends `bytes`: one receive interrupt each
    pub fn uart_receive(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.interrupt(Interrupt::UartRx(*byte));
        }
    }

    /// What the Main MCU sees on its mode and select inputs
    pub fn main_mcu_view(&self) -> (bool, bool, bool) {
        (
            self.io.level(Line::ProgRunToMain),
            self.io.level(Line::MasterSlaveToMain),
            self.io.level(Line::ChipSelectToMain),
        )
    }
}
