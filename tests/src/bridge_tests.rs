//! USB <-> UART bridge sessions against the simulated board

use auxmcu_core::test_utils::SimBoard;
use auxmcu_core::{ChannelId, ControlLines, Direction, Interrupt, Line};
use proptest::prelude::*;
use rstest::rstest;

fn connected(lines: ControlLines) -> SimBoard {
    let mut board = SimBoard::booted().unwrap();
    board.host_connect(lines).unwrap();
    board
}

#[test]
fn test_connect_brings_uart_up() {
    let board = connected(ControlLines::default());
    assert_eq!(board.uart.baud_rate(), Some(38_400));
    assert!(board.uart.interrupts_enabled());
    assert!(board.app.bridge().link_up());
}

#[test]
fn test_host_bytes_reach_uart_in_order() {
    let mut board = connected(ControlLines::ACTIVE);
    board.host_send(b"hello, main").unwrap();
    assert_eq!(board.uart.sent().as_slice(), b"hello, main");
}

#[test]
fn test_host_bytes_wait_out_busy_transmitter() {
    let mut board = connected(ControlLines::ACTIVE);
    board.uart.set_busy_polls(5);
    board.host_send(b"ab").unwrap();
    assert_eq!(board.uart.sent().as_slice(), b"ab");
    assert_eq!(board.uart.spins(), 10);
}

#[test]
fn test_one_byte_per_poll() {
    let mut board = connected(ControlLines::ACTIVE);
    board.usb.host_write(ChannelId::Data, b"xyz");
    board.poll().unwrap();
    assert_eq!(board.uart.sent().as_slice(), b"x");
    assert_eq!(board.usb.pending_inbound(ChannelId::Data), 2);
}

#[test]
fn test_control_channel_bytes_never_reach_uart() {
    let mut board = connected(ControlLines::ACTIVE);
    board.usb.host_write(ChannelId::Control, b"ctl");
    for _ in 0..3 {
        board.poll().unwrap();
    }
    assert!(board.uart.sent().is_empty());
    // Serviced every pass, but left unread
    assert_eq!(board.usb.service_calls(ChannelId::Control), 4);
    assert_eq!(board.usb.pending_inbound(ChannelId::Control), 3);
}

#[rstest]
#[case(ControlLines::from_bits(0), false)]
#[case(ControlLines::from_bits(1), false)]
#[case(ControlLines::PARTIAL, false)]
#[case(ControlLines::ACTIVE, true)]
fn test_uart_rx_relayed_only_when_data_active(#[case] lines: ControlLines, #[case] relayed: bool) {
    let mut board = connected(ControlLines::default());
    board.set_control_lines(ChannelId::Data, lines).unwrap();
    board.uart_receive(&[0x10, 0x20]);

    let uplinked = board.usb.host_read(ChannelId::Data);
    if relayed {
        assert_eq!(uplinked.as_slice(), &[0x10, 0x20]);
    } else {
        assert!(uplinked.is_empty());
    }
    assert_eq!(board.app.indicators().rx(), relayed);
    assert!(board.usb.host_read(ChannelId::Control).is_empty());
}

#[rstest]
#[case(ChannelId::Data)]
#[case(ChannelId::Control)]
fn test_either_channel_toggles_uart_interrupts(#[case] channel: ChannelId) {
    let mut board = connected(ControlLines::default());

    board.set_control_lines(channel, ControlLines::PARTIAL).unwrap();
    assert!(!board.uart.interrupts_enabled());

    board.set_control_lines(channel, ControlLines::ACTIVE).unwrap();
    assert!(board.uart.interrupts_enabled());

    // DTR only: no change
    board.set_control_lines(channel, ControlLines::from_bits(1)).unwrap();
    assert!(board.uart.interrupts_enabled());
}

#[rstest]
#[case(ChannelId::Data)]
#[case(ChannelId::Control)]
fn test_close_burst_between_polls_disables_uart(#[case] channel: ChannelId) {
    let mut board = connected(ControlLines::default());
    board.set_control_lines(channel, ControlLines::ACTIVE).unwrap();
    assert!(board.uart.interrupts_enabled());

    board.usb.set_control_lines(channel, ControlLines::PARTIAL);
    board.usb.set_control_lines(channel, ControlLines::from_bits(0));
    board.poll().unwrap();

    assert!(!board.uart.interrupts_enabled());
    board.uart_receive(b"x");
    assert!(board.usb.host_read(ChannelId::Data).is_empty());
}

#[test]
fn test_control_channel_gate_does_not_relay() {
    let mut board = connected(ControlLines::default());
    board.set_control_lines(ChannelId::Control, ControlLines::ACTIVE).unwrap();
    assert!(board.uart.interrupts_enabled());

    board.uart_receive(b"?");
    assert!(board.usb.host_read(ChannelId::Data).is_empty());
}

#[test]
fn test_indicators_follow_traffic_and_tick() {
    let mut board = connected(ControlLines::ACTIVE);

    board.uart_receive(b"r");
    board.interrupt(Interrupt::UartTxComplete);
    assert!(!board.io.level(Line::RxLed));
    assert!(!board.io.level(Line::TxLed));

    board.interrupt(Interrupt::TimerTick);
    assert!(board.io.level(Line::RxLed));
    assert!(board.io.level(Line::TxLed));

    // A tick with nothing lit still forces both LEDs off
    board.io.clear_writes();
    board.interrupt(Interrupt::TimerTick);
    assert_eq!(board.io.writes().len(), 2);
}

#[test]
fn test_disconnect_releases_uart() {
    let mut board = connected(ControlLines::ACTIVE);
    board.host_disconnect().unwrap();

    assert!(!board.uart.is_initialized());
    assert!(!board.uart.interrupts_enabled());
    assert_eq!(board.io.direction(Line::UartTx), Direction::In);
    assert_eq!(board.io.direction(Line::UartRx), Direction::In);

    // Host bytes arriving while down are discarded, not queued
    board.usb.host_write(ChannelId::Data, b"late");
    board.host_send(b"").unwrap();
    assert!(board.uart.sent().is_empty());

    board.host_connect(ControlLines::ACTIVE).unwrap();
    board.host_send(b"again").unwrap();
    assert_eq!(board.uart.sent().as_slice(), b"again");
}

fn control_change() -> impl Strategy<Value = (ChannelId, u8)> {
    (prop_oneof![Just(ChannelId::Data), Just(ChannelId::Control)], 0u8..4)
}

proptest! {
    /// The gate follows the last 2 or 3 reported on a channel whose lines
    /// actually changed
    #[test]
    fn prop_gate_tracks_last_effective_change(
        changes in proptest::collection::vec(control_change(), 1..32),
    ) {
        let mut board = connected(ControlLines::default());
        let mut recorded = [0u8; 2];
        let mut enabled = true;

        for (channel, bits) in changes {
            board.set_control_lines(channel, ControlLines::from_bits(bits)).unwrap();
            if recorded[channel.index()] != bits {
                recorded[channel.index()] = bits;
                match bits {
                    3 => enabled = true,
                    2 => enabled = false,
                    _ => {}
                }
            }
            prop_assert_eq!(board.uart.interrupts_enabled(), enabled);
        }
    }

    #[test]
    fn prop_relay_preserves_bytes(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut board = connected(ControlLines::ACTIVE);
        board.host_send(&data).unwrap();
        let sent = board.uart.sent();
        prop_assert_eq!(sent.as_slice(), data.as_slice());

        board.uart_receive(&data);
        let uplinked = board.usb.host_read(ChannelId::Data);
        prop_assert_eq!(uplinked.as_slice(), data.as_slice());
    }
}
