//! Bring-up, foreground loop and interrupt dispatch

use embedded_hal::delay::DelayNs;
use crate::arbitration;
use crate::bridge::CommBridge;
use crate::exti::configure_edge_triggers;
use crate::hal::{EdgeInterrupts, GpioBank, HalError, LinkEvent, TickTimer, UartChannel, UsbSerialEndpoint, UsbUplink};
use crate::indicators::ActivityIndicators;
use crate::timer;
use crate::types::{BridgeConfig, ChannelId, Level, Line, ModeState};

/// The five interrupt sources of the AUX MCU
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    /// Line A, rising edge
    ResetEdge,
    /// Line B, either edge
    BusSelectEdge,
    /// Periodic tick
    TimerTick,
    /// UART receive complete with the received byte
    UartRx(u8),
    /// UART transmit complete
    UartTxComplete,
}

/// AUX MCU application: configuration plus the state shared with interrupts.
///
/// Every method takes `&self`, so a single instance can live in a `static`
/// and be reached from the foreground loop and all handlers.
pub struct AuxMcu {
    config: BridgeConfig,
    bridge: CommBridge,
    indicators: ActivityIndicators,
}

impl AuxMcu {
    pub const fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            bridge: CommBridge::new(),
            indicators: ActivityIndicators::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn bridge(&self) -> &CommBridge {
        &self.bridge
    }

    pub fn indicators(&self) -> &ActivityIndicators {
        &self.indicators
    }

    /// Configure pins, edge triggers and the tick, then optionally run a
    /// first arbitration pass and reset the Main MCU.
    ///
    /// Run with interrupts still globally disabled.
    pub fn bring_up<G, E, T, D>(&self, io: &mut G, edges: &mut E, tick: &mut T, delay: &mut D) -> Result<(), HalError>
    where
        G: GpioBank<Error = HalError>,
        E: EdgeInterrupts<Error = HalError>,
        T: TickTimer<Error = HalError>,
        D: DelayNs,
    {
        for line in Line::ALL {
            io.configure_direction(line, line.boot_direction())?;
        }
        io.write_pin(Line::TxLed, Level::High)?;
        io.write_pin(Line::RxLed, Level::High)?;

        tick.start(self.config.tick_hz)?;
        configure_edge_triggers(edges)?;
        info!("pins configured, tick at {=u32} Hz", self.config.tick_hz);

        if self.config.arbitrate_on_boot {
            arbitration::arbitrate_all(io)?;
        }
        if self.config.reset_main_on_boot {
            arbitration::reset_main_mcu(io, delay, self.config.reset_pulse_ns)?;
        }
        Ok(())
    }

    /// One foreground iteration: link events, control-line changes, then
    /// the data and control channels.
    ///
    /// Both channels are serviced every pass; the first error is returned
    /// afterwards.
    pub fn poll<S, U, G>(&self, usb: &mut S, uart: &mut U, io: &mut G) -> Result<(), HalError>
    where
        S: UsbSerialEndpoint<Error = HalError>,
        U: UartChannel<Error = HalError>,
        G: GpioBank<Error = HalError>,
    {
        let events = self.handle_host_events(usb, uart, io);
        let data = self.bridge.service_data_channel(usb, uart);
        let control = self.bridge.service_control_channel(usb);
        events?;
        data?;
        control
    }

    fn handle_host_events<S, U, G>(&self, usb: &mut S, uart: &mut U, io: &mut G) -> Result<(), HalError>
    where
        S: UsbSerialEndpoint<Error = HalError>,
        U: UartChannel<Error = HalError>,
        G: GpioBank<Error = HalError>,
    {
        while let Some(event) = usb.take_link_event() {
            match event {
                LinkEvent::HostConnect => self.bridge.on_host_connect(uart, self.config.baud_rate)?,
                LinkEvent::HostDisconnect => self.bridge.on_host_disconnect(uart, io)?,
            }
        }

        // In order, so a 3 -> 2 -> 0 burst still closes the gate
        while let Some(change) = usb.take_control_change() {
            self.bridge.on_control_line_state_changed(uart, change.channel, change.lines)?;
        }
        for channel in ChannelId::ALL {
            self.bridge.sync_control_lines(usb, uart, channel)?;
        }
        Ok(())
    }

    /// Interrupt-context dispatch; errors are logged, never propagated
    pub fn on_interrupt<G, Q>(&self, irq: Interrupt, io: &mut G, uplink: &mut Q)
    where
        G: GpioBank<Error = HalError>,
        Q: UsbUplink<Error = HalError>,
    {
        let result = match irq {
            Interrupt::ResetEdge => arbitration::on_reset_edge(io).map(|_| ()),
            Interrupt::BusSelectEdge => arbitration::on_bus_select_edge(io).map(|_| ()),
            Interrupt::TimerTick => timer::on_tick(&self.indicators, io),
            Interrupt::UartRx(byte) => self.bridge.on_uart_rx(byte, uplink, &self.indicators, io).map(|_| ()),
            Interrupt::UartTxComplete => self.bridge.on_uart_tx_complete(&self.indicators, io),
        };

        if let Err(_e) = result {
            warn!("{:?} handler failed: {:?}", irq, _e);
        }
    }

    /// Mode the switches currently describe
    pub fn mode_state<G: GpioBank>(&self, io: &mut G) -> Result<ModeState, G::Error> {
        arbitration::mode_state(io)
    }
}

impl Default for AuxMcu {
    fn default() -> Self {
        Self::new(BridgeConfig::DEFAULT)
    }
}
