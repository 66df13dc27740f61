//! Dual CDC-ACM USB device
//!
//! Two serial interfaces on one composite device: interface 0 relays the
//! Main MCU UART, interface 1 is the control channel. The USB stack is
//! polled from the foreground loop; UART receive interrupts hand bytes over
//! through a single-producer queue.

use auxmcu_core::hal::{BusState, ControlChange, HalError, LinkEvent, LinkTracker, UsbSerialEndpoint, UsbUplink};
use auxmcu_core::types::{ChannelId, ControlLines};
use heapless::spsc::{Consumer, Producer};
use heapless::Deque;
use stm32_usbd::UsbPeripheral;
use usb_device::bus::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

/// Depth of the UART-to-host queue
pub const UPLINK_DEPTH: usize = 128;

/// Full-speed USBD block at the F103-compatible address
pub struct Ch32Usbd;

unsafe impl UsbPeripheral for Ch32Usbd {
    const REGISTERS: *const () = 0x4000_5C00 as *const ();
    const DP_PULL_UP_FEATURE: bool = false;
    const EP_MEMORY: *const () = 0x4000_6000 as *const ();
    const EP_MEMORY_SIZE: usize = 512;
    const EP_MEMORY_ACCESS_2X16: bool = false;

    fn enable() {
        const RCC_APB1PCENR: u32 = 0x4002_101C;
        const EXTEN_CTR: u32 = 0x4002_3800;
        unsafe {
            // USBD clock
            let apb1 = core::ptr::read_volatile(RCC_APB1PCENR as *const u32);
            core::ptr::write_volatile(RCC_APB1PCENR as *mut u32, apb1 | (1 << 23));
            // Internal D+ pull-up
            let exten = core::ptr::read_volatile(EXTEN_CTR as *const u32);
            core::ptr::write_volatile(EXTEN_CTR as *mut u32, exten | (1 << 1));
        }
    }

    fn startup_delay() {
        // tSTARTUP is 1 us; a few hundred cycles at 96 MHz
        for _ in 0..512 {
            unsafe { riscv::asm::nop() };
        }
    }
}

pub type UsbBusType = stm32_usbd::UsbBus<Ch32Usbd>;

/// Create the bus allocator for [`Ch32Usbd`]
pub fn bus_allocator() -> UsbBusAllocator<UsbBusType> {
    UsbBusType::new(Ch32Usbd)
}

/// Interrupt-side half of the data uplink
pub struct UplinkProducer {
    producer: Producer<'static, u8, UPLINK_DEPTH>,
}

impl UplinkProducer {
    pub fn new(producer: Producer<'static, u8, UPLINK_DEPTH>) -> Self {
        Self { producer }
    }
}

impl UsbUplink for UplinkProducer {
    type Error = HalError;

    fn send_byte(&mut self, channel: ChannelId, byte: u8) -> Result<(), Self::Error> {
        match channel {
            ChannelId::Data => self.producer.enqueue(byte).map_err(|_| HalError::UsbError),
            // Only the data channel is fed from interrupt context
            ChannelId::Control => Err(HalError::UsbError),
        }
    }
}

/// Composite device with both CDC interfaces
pub struct DualCdc<'a> {
    device: UsbDevice<'a, UsbBusType>,
    ports: [SerialPort<'a, UsbBusType>; 2],
    uplink: Consumer<'static, u8, UPLINK_DEPTH>,
    link: LinkTracker,
    link_events: Deque<LinkEvent, 4>,
    lines: [ControlLines; 2],
    control_changes: Deque<ControlChange, 8>,
}

impl<'a> DualCdc<'a> {
    pub fn new(
        alloc: &'a UsbBusAllocator<UsbBusType>,
        uplink: Consumer<'static, u8, UPLINK_DEPTH>,
    ) -> Result<Self, HalError> {
        // Ports first so they take interfaces 0 and 1
        let ports = [SerialPort::new(alloc), SerialPort::new(alloc)];

        let device = UsbDeviceBuilder::new(alloc, UsbVidPid(0x03EB, 0x204E))
            .strings(&[StringDescriptors::default()
                .manufacturer("ASA")
                .product("AUX MCU Dual Serial")
                .serial_number("AUXMCU")])
            .map_err(|_| HalError::UsbError)?
            .composite_with_iads()
            .max_packet_size_0(64)
            .map_err(|_| HalError::UsbError)?
            .build();

        Ok(Self {
            device,
            ports,
            uplink,
            link: LinkTracker::new(),
            link_events: Deque::new(),
            lines: [ControlLines::default(); 2],
            control_changes: Deque::new(),
        })
    }

    fn port(&mut self, channel: ChannelId) -> &mut SerialPort<'a, UsbBusType> {
        &mut self.ports[channel.index()]
    }

    /// Run the device state machine, then record link transitions and any
    /// control-line change the poll delivered
    fn poll_device(&mut self) {
        let [data, control] = &mut self.ports;
        self.device.poll(&mut [data, control]);
        self.sample_control_lines();

        let state = match self.device.state() {
            UsbDeviceState::Configured => BusState::Configured,
            UsbDeviceState::Suspend => BusState::Suspended,
            _ => BusState::Unconfigured,
        };
        if let Some(event) = self.link.update(state) {
            #[cfg(feature = "defmt")]
            defmt::info!("USB link: {}", event);
            // Oldest events are dropped if the loop falls behind
            if self.link_events.is_full() {
                self.link_events.pop_front();
            }
            self.link_events.push_back(event).ok();
        }
    }

    /// One SET_CONTROL_LINE_STATE is handled per `poll`, so sampling after
    /// each poll sees every transition
    fn sample_control_lines(&mut self) {
        for channel in ChannelId::ALL {
            let port = &self.ports[channel.index()];
            let lines = ControlLines::from_lines(port.dtr(), port.rts());
            if lines == self.lines[channel.index()] {
                continue;
            }
            self.lines[channel.index()] = lines;
            // Overflow is caught up by the foreground's snapshot comparison
            if self.control_changes.push_back(ControlChange { channel, lines }).is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("control-line queue full");
            }
        }
    }

    fn drain_uplink(&mut self) {
        while let Some(byte) = self.uplink.peek().copied() {
            match self.ports[ChannelId::Data.index()].write(&[byte]) {
                Ok(1) => {
                    self.uplink.dequeue();
                }
                // Endpoint buffer full; retry next pass
                _ => break,
            }
        }
    }
}

impl UsbUplink for DualCdc<'_> {
    type Error = HalError;

    fn send_byte(&mut self, channel: ChannelId, byte: u8) -> Result<(), Self::Error> {
        match self.port(channel).write(&[byte]) {
            Ok(1) => Ok(()),
            _ => Err(HalError::UsbError),
        }
    }
}

impl UsbSerialEndpoint for DualCdc<'_> {
    fn receive_byte(&mut self, channel: ChannelId) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.port(channel).read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn service_task(&mut self, channel: ChannelId) -> Result<(), Self::Error> {
        self.poll_device();
        if channel == ChannelId::Data {
            self.drain_uplink();
        }
        match self.port(channel).flush() {
            Ok(()) | Err(UsbError::WouldBlock) | Err(UsbError::InvalidState) => Ok(()),
            Err(_) => Err(HalError::UsbError),
        }
    }

    fn control_lines(&self, channel: ChannelId) -> ControlLines {
        let port = &self.ports[channel.index()];
        ControlLines::from_lines(port.dtr(), port.rts())
    }

    fn take_link_event(&mut self) -> Option<LinkEvent> {
        self.link_events.pop_front()
    }

    fn take_control_change(&mut self) -> Option<ControlChange> {
        self.control_changes.pop_front()
    }
}
