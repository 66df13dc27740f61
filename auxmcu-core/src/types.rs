//! Core data types for the AUX MCU bridge

/// Master/Slave designation on the ASA BUS
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Drives the bus; chip-select towards the Main MCU is don't-care
    Master,
    /// Selected through the shared address-compare line
    Slave,
}

impl Role {
    /// Level of the M/S switch and of the M/S signal to the Main MCU
    pub const fn from_level(high: bool) -> Self {
        if high {
            Role::Master
        } else {
            Role::Slave
        }
    }

    pub const fn level(&self) -> bool {
        matches!(self, Role::Master)
    }
}

/// Program/Run designation of the Main MCU
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunMode {
    /// Main MCU held in firmware-update mode
    Program,
    /// Main MCU runs its application
    Run,
}

impl RunMode {
    /// Level of the Prog/Run switch and of the Prog/Run signal to the Main MCU
    pub const fn from_level(high: bool) -> Self {
        if high {
            RunMode::Program
        } else {
            RunMode::Run
        }
    }

    pub const fn level(&self) -> bool {
        matches!(self, RunMode::Program)
    }
}

/// Derived mode of the device: one of four {role} x {run mode} combinations.
///
/// Never stored; always recomputed from the switch levels.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModeState {
    pub role: Role,
    pub run_mode: RunMode,
}

/// ASA BUS address as sampled from the shared bus (3 bits) and the local
/// knob (4 bits)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressPair {
    /// Bus-sampled address, 0..=7
    pub bus: u8,
    /// Knob-sampled address, 0..=15
    pub knob: u8,
}

impl AddressPair {
    pub const BUS_MASK: u8 = 0b0111;
    pub const KNOB_MASK: u8 = 0b1111;

    pub const fn new(bus: u8, knob: u8) -> Self {
        Self {
            bus: bus & Self::BUS_MASK,
            knob: knob & Self::KNOB_MASK,
        }
    }

    /// Plain value equality; knob positions 8..=15 can never match
    pub const fn matches(&self) -> bool {
        self.bus == self.knob
    }
}

/// The two logical USB CDC channels
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    /// Byte relay to and from the Main MCU UART
    Data,
    /// Control/status channel, currently housekeeping only
    Control,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Data, ChannelId::Control];

    pub const fn index(&self) -> usize {
        match self {
            ChannelId::Data => 0,
            ChannelId::Control => 1,
        }
    }
}

/// Host-to-device control-line bitmask of a CDC channel
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlLines(u8);

impl ControlLines {
    pub const DTR: u8 = 0b01;
    pub const RTS: u8 = 0b10;

    /// Both lines asserted: UART interrupts are enabled
    pub const ACTIVE: ControlLines = ControlLines(Self::DTR | Self::RTS);
    /// Only RTS asserted: UART interrupts are disabled
    pub const PARTIAL: ControlLines = ControlLines(Self::RTS);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn from_lines(dtr: bool, rts: bool) -> Self {
        Self((dtr as u8) | ((rts as u8) << 1))
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn dtr(&self) -> bool {
        self.0 & Self::DTR != 0
    }

    pub const fn rts(&self) -> bool {
        self.0 & Self::RTS != 0
    }

    /// Per-interface host readiness (DTR set)
    pub const fn host_ready(&self) -> bool {
        self.dtr()
    }
}

/// Logic level of a GPIO line
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

/// GPIO line direction
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Input, high impedance
    In,
    /// Push-pull output
    Out,
}

/// Logical GPIO lines of the AUX MCU
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    ProgRunSwitch,
    MasterSlaveSwitch,
    KnobBit0,
    KnobBit1,
    KnobBit2,
    KnobBit3,
    BusAddr0,
    BusAddr1,
    BusAddr2,
    /// Line A: reset button input, doubles as the Main MCU reset output
    ResetDetect,
    /// Line B: ASA BUS chip-select input
    BusChipSelect,
    ProgRunToMain,
    MasterSlaveToMain,
    ChipSelectToMain,
    TxLed,
    RxLed,
    UartTx,
    UartRx,
}

impl Line {
    pub const COUNT: usize = 18;

    pub const ALL: [Line; Line::COUNT] = [
        Line::ProgRunSwitch,
        Line::MasterSlaveSwitch,
        Line::KnobBit0,
        Line::KnobBit1,
        Line::KnobBit2,
        Line::KnobBit3,
        Line::BusAddr0,
        Line::BusAddr1,
        Line::BusAddr2,
        Line::ResetDetect,
        Line::BusChipSelect,
        Line::ProgRunToMain,
        Line::MasterSlaveToMain,
        Line::ChipSelectToMain,
        Line::TxLed,
        Line::RxLed,
        Line::UartTx,
        Line::UartRx,
    ];

    pub const KNOB: [Line; 4] = [Line::KnobBit0, Line::KnobBit1, Line::KnobBit2, Line::KnobBit3];
    pub const BUS_ADDR: [Line; 3] = [Line::BusAddr0, Line::BusAddr1, Line::BusAddr2];

    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Direction the line takes at bring-up
    pub const fn boot_direction(&self) -> Direction {
        match self {
            Line::ProgRunToMain
            | Line::MasterSlaveToMain
            | Line::ChipSelectToMain
            | Line::TxLed
            | Line::RxLed => Direction::Out,
            // UART pins stay high impedance until the host connects
            _ => Direction::In,
        }
    }
}

/// Bridge configuration parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeConfig {
    /// UART baud rate towards the Main MCU (frame is fixed 8N1)
    pub baud_rate: u32,
    /// Indicator clear tick rate
    pub tick_hz: u32,
    /// Main MCU reset pulse width
    pub reset_pulse_ns: u32,
    /// Run one full arbitration pass during bring-up
    pub arbitrate_on_boot: bool,
    /// Pulse the Main MCU reset line at the end of bring-up
    pub reset_main_on_boot: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BridgeConfig {
    pub const DEFAULT: BridgeConfig = BridgeConfig {
        baud_rate: 38_400,
        tick_hz: 200,
        reset_pulse_ns: 1_000, // 16 cycles at 16 MHz
        arbitrate_on_boot: true,
        reset_main_on_boot: false,
    };

    /// Create a new configuration with validation
    pub fn new(
        baud_rate: u32,
        tick_hz: u32,
        reset_pulse_ns: u32,
        arbitrate_on_boot: bool,
        reset_main_on_boot: bool,
    ) -> Result<Self, &'static str> {
        if !(1_200..=1_000_000).contains(&baud_rate) {
            return Err("Baud rate must be between 1200 and 1000000");
        }
        if tick_hz == 0 || tick_hz > 10_000 {
            return Err("Tick rate must be between 1 and 10000 Hz");
        }
        if reset_pulse_ns == 0 || reset_pulse_ns > 1_000_000 {
            return Err("Reset pulse must be between 1ns and 1ms");
        }

        Ok(Self {
            baud_rate,
            tick_hz,
            reset_pulse_ns,
            arbitrate_on_boot,
            reset_main_on_boot,
        })
    }

    /// Worst-case time of one 8N1 byte on the wire
    pub fn byte_time_us(&self) -> u32 {
        (crate::uart::FRAME_BITS * 1_000_000).div_ceil(self.baud_rate)
    }

    /// Tick period in microseconds
    pub fn tick_period_us(&self) -> u32 {
        1_000_000 / self.tick_hz
    }
}
