//! Arbitration over real embedded-hal pins, checked against
//! embedded-hal-mock expectations

use auxmcu_core::arbitration;
use auxmcu_core::{EmbeddedHalGpio, GpioBank, HalError, Level, Line, ModeState, Role, RunMode};
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::pin::{Mock as PinMock, State, Transaction};

fn bank(expect: impl Fn(Line) -> Vec<Transaction>) -> EmbeddedHalGpio<PinMock> {
    EmbeddedHalGpio::new(Line::ALL.map(|line| PinMock::new(&expect(line))))
}

fn finish(bank: EmbeddedHalGpio<PinMock>) {
    for mut pin in bank.release() {
        pin.done();
    }
}

fn level(high: bool) -> State {
    if high {
        State::High
    } else {
        State::Low
    }
}

/// Reads one bit of `value` for each line in `lines`, first line is bit 0
fn bit_of(lines: &[Line], line: Line, value: u8) -> Option<Transaction> {
    lines
        .iter()
        .position(|l| *l == line)
        .map(|bit| Transaction::get(level(value & (1 << bit) != 0)))
}

#[test]
fn test_slave_program_with_matching_address() {
    let mut io = bank(|line| match line {
        Line::ProgRunSwitch => vec![Transaction::get(State::High)],
        Line::MasterSlaveSwitch => vec![Transaction::get(State::Low)],
        Line::ProgRunToMain => vec![Transaction::set(State::High)],
        Line::MasterSlaveToMain => vec![Transaction::set(State::Low)],
        Line::ChipSelectToMain => vec![Transaction::set(State::Low)],
        other => bit_of(&Line::BUS_ADDR, other, 6)
            .or_else(|| bit_of(&Line::KNOB, other, 6))
            .into_iter()
            .collect(),
    });

    let state = arbitration::arbitrate_all(&mut io).unwrap();
    assert_eq!(state, ModeState { role: Role::Slave, run_mode: RunMode::Program });
    finish(io);
}

#[test]
fn test_master_run_never_touches_address_lines() {
    let mut io = bank(|line| match line {
        Line::ProgRunSwitch => vec![Transaction::get(State::Low)],
        Line::MasterSlaveSwitch => vec![Transaction::get(State::High)],
        Line::ProgRunToMain => vec![Transaction::set(State::Low)],
        Line::MasterSlaveToMain => vec![Transaction::set(State::High)],
        _ => vec![],
    });

    let state = arbitration::arbitrate_all(&mut io).unwrap();
    assert_eq!(state, ModeState { role: Role::Master, run_mode: RunMode::Run });
    finish(io);
}

#[test]
fn test_reset_edge_in_run_reads_only_prog_run() {
    let mut io = bank(|line| match line {
        Line::ProgRunSwitch => vec![Transaction::get(State::Low)],
        Line::ProgRunToMain => vec![Transaction::set(State::Low)],
        _ => vec![],
    });

    assert_eq!(arbitration::on_reset_edge(&mut io), Ok(RunMode::Run));
    finish(io);
}

#[test]
fn test_reset_pulse_on_shared_line() {
    let mut io = bank(|line| match line {
        Line::ResetDetect => vec![Transaction::set(State::Low), Transaction::set(State::High)],
        _ => vec![],
    });

    arbitration::reset_main_mcu(&mut io, &mut NoopDelay::new(), 1_000).unwrap();
    assert_eq!(io.direction(Line::ResetDetect), auxmcu_core::Direction::In);
    finish(io);
}

#[test]
fn test_input_lines_refuse_writes() {
    let mut io = bank(|_| vec![]);
    assert_eq!(io.write_pin(Line::ProgRunSwitch, Level::High), Err(HalError::GpioError));
    assert_eq!(io.write_pin(Line::UartTx, Level::High), Err(HalError::GpioError));
    finish(io);
}
