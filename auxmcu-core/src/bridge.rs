//! USB CDC <-> UART communication bridge

use portable_atomic::{AtomicBool, AtomicU8, Ordering};
use crate::hal::{GpioBank, UartChannel, UsbSerialEndpoint, UsbUplink};
use crate::indicators::{ActivityIndicators, Indicator};
use crate::types::{ChannelId, ControlLines, Direction, Line};

/// Outcome of a UART receive interrupt
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxOutcome {
    /// Byte queued to the data channel
    Relayed,
    /// Data channel not in the combined-line state; byte discarded
    Dropped,
}

/// What a control-line change did to the UART interrupt gate
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateChange {
    Enabled,
    Disabled,
    Unchanged,
}

/// Bridge state shared between the foreground loop and interrupt handlers
pub struct CommBridge {
    control_lines: [AtomicU8; 2],
    link_up: AtomicBool,
    uart_irq_enabled: AtomicBool,
}

impl CommBridge {
    pub const fn new() -> Self {
        Self {
            control_lines: [AtomicU8::new(0), AtomicU8::new(0)],
            link_up: AtomicBool::new(false),
            uart_irq_enabled: AtomicBool::new(false),
        }
    }

    /// Last control-line state recorded for `channel`
    pub fn control_lines(&self, channel: ChannelId) -> ControlLines {
        ControlLines::from_bits(self.control_lines[channel.index()].load(Ordering::Acquire))
    }

    /// Per-interface host readiness
    pub fn host_ready(&self, channel: ChannelId) -> bool {
        self.control_lines(channel).host_ready()
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn uart_irq_enabled(&self) -> bool {
        self.uart_irq_enabled.load(Ordering::Acquire)
    }

    /// USB host attached: bring the UART up with interrupts on
    pub fn on_host_connect<U: UartChannel>(&self, uart: &mut U, baud_rate: u32) -> Result<(), U::Error> {
        uart.initialize(baud_rate)?;
        uart.enable_interrupts()?;
        self.uart_irq_enabled.store(true, Ordering::Release);
        self.link_up.store(true, Ordering::Release);
        info!("host connected, UART up at {} baud", baud_rate);
        Ok(())
    }

    /// USB host gone: shut the UART down and release its pins
    pub fn on_host_disconnect<U, G>(&self, uart: &mut U, io: &mut G) -> Result<(), U::Error>
    where
        U: UartChannel,
        G: GpioBank,
        U::Error: From<G::Error>,
    {
        self.link_up.store(false, Ordering::Release);
        uart.disable_interrupts()?;
        self.uart_irq_enabled.store(false, Ordering::Release);
        uart.deinitialize()?;
        io.configure_direction(Line::UartTx, Direction::In)?;
        io.configure_direction(Line::UartRx, Direction::In)?;
        info!("host disconnected, UART down");
        Ok(())
    }

    /// Host changed the control lines of `channel`.
    ///
    /// Bitmask 3 enables UART interrupts and 2 disables them, whichever
    /// channel reported it. Other values leave the gate alone.
    pub fn on_control_line_state_changed<U: UartChannel>(
        &self,
        uart: &mut U,
        channel: ChannelId,
        lines: ControlLines,
    ) -> Result<GateChange, U::Error> {
        self.control_lines[channel.index()].store(lines.bits(), Ordering::Release);

        let change = if lines == ControlLines::ACTIVE {
            uart.enable_interrupts()?;
            self.uart_irq_enabled.store(true, Ordering::Release);
            GateChange::Enabled
        } else if lines == ControlLines::PARTIAL {
            uart.disable_interrupts()?;
            self.uart_irq_enabled.store(false, Ordering::Release);
            GateChange::Disabled
        } else {
            GateChange::Unchanged
        };
        info!("{:?} control lines {=u8}: {:?}", channel, lines.bits(), change);
        Ok(change)
    }

    /// Compare the endpoint's control lines with the recorded ones and
    /// dispatch a change. Catches up when the endpoint's change queue
    /// overflowed.
    pub fn sync_control_lines<S, U>(
        &self,
        usb: &S,
        uart: &mut U,
        channel: ChannelId,
    ) -> Result<Option<GateChange>, U::Error>
    where
        S: UsbSerialEndpoint,
        U: UartChannel,
    {
        let current = usb.control_lines(channel);
        if current == self.control_lines(channel) {
            return Ok(None);
        }
        self.on_control_line_state_changed(uart, channel, current).map(Some)
    }

    /// One data-channel pass: relay at most one host byte to the UART, then
    /// service the endpoint. The endpoint is serviced even when the UART
    /// write fails; the UART error is reported first.
    pub fn service_data_channel<S, U>(&self, usb: &mut S, uart: &mut U) -> Result<Option<u8>, S::Error>
    where
        S: UsbSerialEndpoint,
        U: UartChannel,
        S::Error: From<U::Error>,
    {
        let relayed = match usb.receive_byte(ChannelId::Data) {
            Some(byte) if self.link_up() => uart.transmit_byte(byte).map(|()| Some(byte)),
            Some(_) => {
                trace!("host byte discarded, UART down");
                Ok(None)
            }
            None => Ok(None),
        };
        let serviced = usb.service_task(ChannelId::Data);
        let relayed = relayed?;
        serviced?;
        Ok(relayed)
    }

    /// Control channel: housekeeping only
    pub fn service_control_channel<S: UsbSerialEndpoint>(&self, usb: &mut S) -> Result<(), S::Error> {
        usb.service_task(ChannelId::Control)
    }

    /// UART receive interrupt: relay when the data channel has both lines
    /// asserted, drop otherwise. Dropped bytes do not light RX.
    pub fn on_uart_rx<Q, G>(
        &self,
        byte: u8,
        uplink: &mut Q,
        indicators: &ActivityIndicators,
        io: &mut G,
    ) -> Result<RxOutcome, Q::Error>
    where
        Q: UsbUplink,
        G: GpioBank,
        Q::Error: From<G::Error>,
    {
        if self.control_lines(ChannelId::Data) != ControlLines::ACTIVE {
            trace!("UART byte {=u8:#x} dropped", byte);
            return Ok(RxOutcome::Dropped);
        }
        uplink.send_byte(ChannelId::Data, byte)?;
        indicators.light(io, Indicator::Rx)?;
        Ok(RxOutcome::Relayed)
    }

    /// UART transmit-complete interrupt
    pub fn on_uart_tx_complete<G: GpioBank>(
        &self,
        indicators: &ActivityIndicators,
        io: &mut G,
    ) -> Result<(), G::Error> {
        indicators.light(io, Indicator::Tx)
    }
}

impl Default for CommBridge {
    fn default() -> Self {
        Self::new()
    }
}
