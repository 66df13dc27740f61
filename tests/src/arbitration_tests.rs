//! Mode arbitration against the simulated board

use auxmcu_core::test_utils::{SimBoard, SwitchEvent};
use auxmcu_core::{Interrupt, Line, ModeState, Role, RunMode};
use proptest::prelude::*;
use rstest::rstest;

use crate::{board_in, expected_outputs, ALL_MODES};

#[rstest]
#[case(Role::Master, RunMode::Program)]
#[case(Role::Master, RunMode::Run)]
#[case(Role::Slave, RunMode::Program)]
#[case(Role::Slave, RunMode::Run)]
fn test_bring_up_mirrors_switches(#[case] role: Role, #[case] run_mode: RunMode) {
    let mode = ModeState { role, run_mode };
    let mut board = board_in(mode, 3, 3).unwrap();

    let (pr, ms, cs) = board.main_mcu_view();
    let (want_pr, want_ms, want_cs) = expected_outputs(mode, 3, 3);
    assert_eq!((pr, ms), (want_pr, want_ms));
    if let Some(want_cs) = want_cs {
        assert_eq!(cs, want_cs);
    }
    assert_eq!(board.app.mode_state(&mut board.io).unwrap(), mode);
}

#[rstest]
#[case(0, 0, false)]
#[case(7, 7, false)]
#[case(2, 3, true)]
// Knob positions 8..=15 are never selected
#[case(7, 15, true)]
#[case(0, 8, true)]
fn test_slave_chip_select(#[case] bus: u8, #[case] knob: u8, #[case] deselected: bool) {
    let mode = ModeState { role: Role::Slave, run_mode: RunMode::Run };
    let board = board_in(mode, bus, knob).unwrap();
    assert_eq!(board.io.level(Line::ChipSelectToMain), deselected);
}

#[test]
fn test_reset_in_run_leaves_role_outputs() {
    let mode = ModeState { role: Role::Slave, run_mode: RunMode::Run };
    let mut board = board_in(mode, 1, 1).unwrap();
    board.io.clear_writes();

    // Role switch moves without a bus edge, then reset in RUN
    board.io.set_input(Line::MasterSlaveSwitch, true);
    board.apply(SwitchEvent::ProgRun(RunMode::Run));

    assert!(board.io.writes_to(Line::MasterSlaveToMain).is_empty());
    assert!(!board.io.level(Line::MasterSlaveToMain));
}

#[test]
fn test_reset_in_program_picks_up_role() {
    let mode = ModeState { role: Role::Slave, run_mode: RunMode::Run };
    let mut board = board_in(mode, 1, 1).unwrap();

    board.io.set_input(Line::MasterSlaveSwitch, true);
    board.apply(SwitchEvent::ProgRun(RunMode::Program));

    assert!(board.main_mcu_view().0);
    assert!(board.io.level(Line::MasterSlaveToMain));
}

#[test]
fn test_bus_edge_with_unchanged_switches_is_idempotent() {
    for mode in ALL_MODES {
        let mut board = board_in(mode, 4, 4).unwrap();
        let before = board.main_mcu_view();
        board.interrupt(Interrupt::BusSelectEdge);
        board.interrupt(Interrupt::BusSelectEdge);
        assert_eq!(board.main_mcu_view(), before, "{:?}", mode);
    }
}

#[test]
fn test_master_keeps_last_chip_select() {
    let slave = ModeState { role: Role::Slave, run_mode: RunMode::Run };
    let mut board = board_in(slave, 2, 5).unwrap();
    assert!(board.io.level(Line::ChipSelectToMain));

    board.apply(SwitchEvent::MasterSlave(Role::Master));
    board.apply(SwitchEvent::BusAddress(5));
    assert!(board.io.level(Line::MasterSlaveToMain));
    assert!(board.io.level(Line::ChipSelectToMain));
}

fn switch_event() -> impl Strategy<Value = SwitchEvent> {
    prop_oneof![
        any::<bool>().prop_map(|high| SwitchEvent::ProgRun(RunMode::from_level(high))),
        any::<bool>().prop_map(|high| SwitchEvent::MasterSlave(Role::from_level(high))),
        (0u8..8).prop_map(SwitchEvent::BusAddress),
        (0u8..16).prop_map(SwitchEvent::Knob),
    ]
}

proptest! {
    #[test]
    fn prop_address_match_is_plain_equality(bus in 0u8..8, knob in 0u8..16) {
        let mode = ModeState { role: Role::Slave, run_mode: RunMode::Program };
        let board = board_in(mode, bus, knob).unwrap();
        prop_assert_eq!(!board.io.level(Line::ChipSelectToMain), bus == knob);
    }

    #[test]
    fn prop_edges_converge_on_switch_levels(
        events in proptest::collection::vec(switch_event(), 1..48),
    ) {
        let mut board = SimBoard::booted().unwrap();
        let mut run_mode = RunMode::Run;
        let mut role = Role::Slave;
        let (mut bus, mut knob) = (0u8, 0u8);

        for event in &events {
            board.apply(*event);
            match *event {
                SwitchEvent::ProgRun(m) => run_mode = m,
                SwitchEvent::MasterSlave(r) => role = r,
                SwitchEvent::BusAddress(b) => bus = b,
                SwitchEvent::Knob(k) => knob = k,
            }
        }
        // Knob moves raise no interrupt; the next chip-select edge settles them
        board.interrupt(Interrupt::BusSelectEdge);

        let mode = ModeState { role, run_mode };
        let (pr, ms, cs) = board.main_mcu_view();
        let (want_pr, want_ms, want_cs) = expected_outputs(mode, bus, knob);
        prop_assert_eq!(pr, want_pr);
        prop_assert_eq!(ms, want_ms);
        if let Some(want_cs) = want_cs {
            prop_assert_eq!(cs, want_cs);
        }
    }
}
