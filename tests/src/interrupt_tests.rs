//! Interrupt handlers racing the foreground loop, with tokio tasks standing
//! in for interrupt contexts

use std::sync::Arc;
use std::time::Duration;

use auxmcu_core::hal::mock::{MockGpio, MockUart, MockUsbSerial};
use auxmcu_core::{AuxMcu, BridgeConfig, ChannelId, ControlLines, GpioBank, Interrupt, Line};

fn pins() -> MockGpio {
    let mut io = MockGpio::new();
    for line in Line::ALL {
        io.configure_direction(line, line.boot_direction()).unwrap();
    }
    io
}

fn open_data_channel(app: &AuxMcu) {
    let mut uart = MockUart::new();
    app.bridge()
        .on_control_line_state_changed(&mut uart, ChannelId::Data, ControlLines::ACTIVE)
        .unwrap();
}

/// Tick, receive and transmit-complete handlers hammer the shared state
/// from different threads; every received byte is still relayed and the
/// final tick leaves both indicators clear
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_handlers_share_state() {
    println!("⚡ Testing concurrent interrupt handlers...");

    let app = Arc::new(AuxMcu::new(BridgeConfig::DEFAULT));
    open_data_channel(&app);

    let rx = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut io = pins();
            let mut usb = MockUsbSerial::new();
            for byte in 0..200u8 {
                app.on_interrupt(Interrupt::UartRx(byte), &mut io, &mut usb);
                tokio::task::yield_now().await;
            }
            usb.host_read(ChannelId::Data).len()
        })
    };

    let tx = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut io = pins();
            let mut usb = MockUsbSerial::new();
            for _ in 0..200 {
                app.on_interrupt(Interrupt::UartTxComplete, &mut io, &mut usb);
                tokio::task::yield_now().await;
            }
        })
    };

    let tick = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut io = pins();
            let mut usb = MockUsbSerial::new();
            for _ in 0..100 {
                app.on_interrupt(Interrupt::TimerTick, &mut io, &mut usb);
                tokio::task::yield_now().await;
            }
        })
    };

    let relayed = rx.await.unwrap();
    tx.await.unwrap();
    tick.await.unwrap();
    assert_eq!(relayed, 200);

    let mut io = pins();
    app.on_interrupt(Interrupt::TimerTick, &mut io, &mut MockUsbSerial::new());
    assert!(!app.indicators().rx());
    assert!(!app.indicators().tx());

    println!("  ✅ {} bytes relayed under contention", relayed);
}

/// Gate changes from the foreground racing receive interrupts: bytes are
/// either relayed or dropped, never duplicated
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gate_flapping_during_receive() {
    let app = Arc::new(AuxMcu::new(BridgeConfig::DEFAULT));

    let foreground = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut uart = MockUart::new();
            for i in 0..100 {
                let lines = if i % 2 == 0 { ControlLines::ACTIVE } else { ControlLines::PARTIAL };
                app.bridge()
                    .on_control_line_state_changed(&mut uart, ChannelId::Data, lines)
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let isr = {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut io = pins();
            let mut usb = MockUsbSerial::new();
            for byte in 0..150u8 {
                app.on_interrupt(Interrupt::UartRx(byte), &mut io, &mut usb);
                tokio::task::yield_now().await;
            }
            usb.host_read(ChannelId::Data)
        })
    };

    foreground.await.unwrap();
    let relayed = isr.await.unwrap();

    assert!(relayed.len() <= 150);
    assert!(relayed.windows(2).all(|w| w[0] < w[1]));
    // Last change was PARTIAL
    assert_eq!(app.bridge().control_lines(ChannelId::Data), ControlLines::PARTIAL);
}

/// 200 Hz tick: an RX flash lasts at most one tick period
#[tokio::test(start_paused = true)]
async fn test_rx_flash_cleared_within_one_tick() {
    let app = AuxMcu::new(BridgeConfig::DEFAULT);
    open_data_channel(&app);
    let period = Duration::from_micros(app.config().tick_period_us() as u64);
    assert_eq!(period, Duration::from_millis(5));

    let mut io = pins();
    let mut usb = MockUsbSerial::new();
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    app.on_interrupt(Interrupt::UartRx(b'!'), &mut io, &mut usb);
    let lit_at = tokio::time::Instant::now();
    assert!(!io.level(Line::RxLed));

    ticker.tick().await;
    app.on_interrupt(Interrupt::TimerTick, &mut io, &mut usb);
    assert!(io.level(Line::RxLed));
    assert!(lit_at.elapsed() <= period);
}
