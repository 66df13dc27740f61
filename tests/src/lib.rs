//! Host-side simulation of the AUX MCU: shared scenario helpers and the
//! integration test suites

use auxmcu_core::test_utils::SimBoard;
use auxmcu_core::{BridgeConfig, HalError, ModeState, Role, RunMode};

#[cfg(test)]
mod arbitration_tests;
#[cfg(test)]
mod bridge_tests;
#[cfg(test)]
mod gpio_mock_tests;
#[cfg(test)]
mod interrupt_tests;

/// All four mode combinations
pub const ALL_MODES: [ModeState; 4] = [
    ModeState { role: Role::Master, run_mode: RunMode::Program },
    ModeState { role: Role::Master, run_mode: RunMode::Run },
    ModeState { role: Role::Slave, run_mode: RunMode::Program },
    ModeState { role: Role::Slave, run_mode: RunMode::Run },
];

/// Board with switches and addresses preset, then brought up
pub fn board_in(mode: ModeState, bus: u8, knob: u8) -> Result<SimBoard, HalError> {
    let mut board = SimBoard::new(BridgeConfig::DEFAULT);
    board.set_switches(mode);
    board.set_address(bus, knob);
    board.bring_up()?;
    Ok(board)
}

/// Signals the Main MCU should see for `mode`; chip-select is `None` where
/// it is left untouched (MASTER)
pub fn expected_outputs(mode: ModeState, bus: u8, knob: u8) -> (bool, bool, Option<bool>) {
    let chip_select = match mode.role {
        Role::Slave => Some((bus & 0b111) != (knob & 0b1111)),
        Role::Master => None,
    };
    (mode.run_mode.level(), mode.role.level(), chip_select)
}
