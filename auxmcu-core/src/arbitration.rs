//! ASA BUS mode arbitration
//!
//! Role and run mode are never tracked incrementally. Every entry point
//! re-samples the switches and rewrites the Main-MCU-facing signals, so any
//! interleaving of the edge handlers converges on the current switch levels.

use embedded_hal::delay::DelayNs;
use crate::hal::{sample_bits, GpioBank};
use crate::types::{AddressPair, Direction, Level, Line, ModeState, Role, RunMode};

/// Read the Prog/Run switch (level-sensitive)
pub fn detect_run_mode<G: GpioBank>(io: &mut G) -> Result<RunMode, G::Error> {
    Ok(RunMode::from_level(io.read_pin(Line::ProgRunSwitch)?))
}

/// Read the Master/Slave switch (level-sensitive)
pub fn detect_role<G: GpioBank>(io: &mut G) -> Result<Role, G::Error> {
    Ok(Role::from_level(io.read_pin(Line::MasterSlaveSwitch)?))
}

/// Sample the bus address (3 bits) and the knob address (4 bits)
pub fn sample_address<G: GpioBank>(io: &mut G) -> Result<AddressPair, G::Error> {
    let bus = sample_bits(io, &Line::BUS_ADDR)?;
    let knob = sample_bits(io, &Line::KNOB)?;
    Ok(AddressPair::new(bus, knob))
}

/// True when the bus address equals the knob address
pub fn address_matches<G: GpioBank>(io: &mut G) -> Result<bool, G::Error> {
    Ok(sample_address(io)?.matches())
}

/// Drive the Prog/Run signal to the Main MCU (PROGRAM = high)
pub fn update_run_mode<G: GpioBank>(io: &mut G, mode: RunMode) -> Result<(), G::Error> {
    io.write_pin(Line::ProgRunToMain, mode.level().into())
}

/// Drive the M/S signal to the Main MCU.
///
/// SLAVE writes M/S low, then chip-select low if the address matches and
/// high otherwise. MASTER writes M/S high and leaves chip-select as it was.
pub fn update_role<G: GpioBank>(io: &mut G, role: Role) -> Result<(), G::Error> {
    match role {
        Role::Slave => {
            io.write_pin(Line::MasterSlaveToMain, Level::Low)?;
            let selected = address_matches(io)?;
            io.write_pin(Line::ChipSelectToMain, (!selected).into())
        }
        Role::Master => io.write_pin(Line::MasterSlaveToMain, Level::High),
    }
}

/// Snapshot of the mode the switches currently describe
pub fn mode_state<G: GpioBank>(io: &mut G) -> Result<ModeState, G::Error> {
    Ok(ModeState {
        role: detect_role(io)?,
        run_mode: detect_run_mode(io)?,
    })
}

/// Line A handler: re-arbitrate run mode, and role only when entering PROGRAM
pub fn on_reset_edge<G: GpioBank>(io: &mut G) -> Result<RunMode, G::Error> {
    let run_mode = detect_run_mode(io)?;
    update_run_mode(io, run_mode)?;

    if run_mode == RunMode::Program {
        let role = detect_role(io)?;
        update_role(io, role)?;
        debug!("reset edge: {:?}, {:?}", run_mode, role);
    } else {
        debug!("reset edge: {:?}", run_mode);
    }
    Ok(run_mode)
}

/// Line B handler: re-arbitrate role unconditionally
pub fn on_bus_select_edge<G: GpioBank>(io: &mut G) -> Result<Role, G::Error> {
    let role = detect_role(io)?;
    update_role(io, role)?;
    debug!("bus select edge: {:?}", role);
    Ok(role)
}

/// Full pass over both dimensions, used at bring-up
pub fn arbitrate_all<G: GpioBank>(io: &mut G) -> Result<ModeState, G::Error> {
    let run_mode = detect_run_mode(io)?;
    update_run_mode(io, run_mode)?;
    let role = detect_role(io)?;
    update_role(io, role)?;

    let state = ModeState { role, run_mode };
    info!("arbitrated: {:?}", state);
    Ok(state)
}

/// Pulse the Main MCU reset line low for `pulse_ns`.
///
/// The reset line is shared with the Line A input; it is returned to input
/// afterwards so the reset button keeps working.
pub fn reset_main_mcu<G: GpioBank, D: DelayNs>(
    io: &mut G,
    delay: &mut D,
    pulse_ns: u32,
) -> Result<(), G::Error> {
    io.configure_direction(Line::ResetDetect, Direction::Out)?;
    io.write_pin(Line::ResetDetect, Level::Low)?;
    delay.delay_ns(pulse_ns);
    io.write_pin(Line::ResetDetect, Level::High)?;
    io.configure_direction(Line::ResetDetect, Direction::In)?;
    info!("main MCU reset ({} ns)", pulse_ns);
    Ok(())
}
