//! Integration tests for the serial transport lifecycle
//!
//! These tests validate the complete transport workflow over the mock link:
//! - Connection, reading and disconnection
//! - Fault reporting and the termination sentinel
//! - Write queue ordering and the live write/freeze flags

mod common;

use common::builders::SettingsBuilder;
use common::mock_helpers::MOCK_PORT;
use serde_json::json;
use serial_test::serial;
use crossbeam_channel::{bounded, Sender};
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use uart_console::config::defaults::keys;
use uart_console::transport::{
    ConnectionParams, LinkOpener, SerialLink, FORCE_STOP_TIMEOUT, STOP_TIMEOUT,
};
use uart_console::{ConsoleError, SerialTransport, TransportEvent, TransportState, CONNECTION_TERMINATED};

#[cfg(feature = "mock-link")]
use common::mock_helpers::connected_mock_transport;
#[cfg(feature = "mock-link")]
use uart_console::transport::mock_link::MockOpener;

/// A link whose line reads block for `read_delay`
struct SlowLink {
    read_delay: Duration,
    reading: Sender<()>,
}

impl SerialLink for SlowLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(1)
    }

    fn read_line(&mut self, _max_len: usize) -> io::Result<Vec<u8>> {
        let _ = self.reading.try_send(());
        thread::sleep(self.read_delay);
        Ok(b"slow line\n".to_vec())
    }

    fn write_all(&mut self, _data: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

struct SlowOpener {
    read_delay: Duration,
    reading: Sender<()>,
}

impl LinkOpener for SlowOpener {
    fn open(&self, _params: &ConnectionParams) -> uart_console::Result<Box<dyn SerialLink>> {
        Ok(Box::new(SlowLink {
            read_delay: self.read_delay,
            reading: self.reading.clone(),
        }))
    }
}

/// Connect over a [`SlowLink`] and return once the worker is inside a read
fn connected_slow_transport(read_delay: Duration) -> SerialTransport {
    let (reading, read_started) = bounded(1);
    let transport = SerialTransport::with_opener(
        SettingsBuilder::new().port(MOCK_PORT).build(),
        SlowOpener { read_delay, reading },
    );
    transport.connect().unwrap();
    read_started.recv_timeout(common::test_timeout()).unwrap();
    transport
}

#[test]
fn test_connect_without_port_is_rejected() {
    let transport = SerialTransport::new(SettingsBuilder::new().build());
    let events = transport.events();

    assert!(matches!(transport.connect(), Err(ConsoleError::NoPortSelected)));
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_stop_without_connection() {
    let transport = SerialTransport::new(SettingsBuilder::new().build());
    assert!(transport.stop());
    assert!(transport.stop());
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[test]
fn test_open_missing_device_fails() {
    let settings = SettingsBuilder::new()
        .port("/dev/uart-console-does-not-exist - nothing")
        .build();
    let transport = SerialTransport::new(settings);
    let events = transport.events();

    assert!(matches!(transport.connect(), Err(ConsoleError::Open { .. })));
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert!(events.try_recv().is_err());
}

#[test]
#[cfg(feature = "mock-link")]
fn test_open_failure_leaves_transport_reusable() {
    let transport = SerialTransport::with_opener(
        SettingsBuilder::new().port(MOCK_PORT).build(),
        MockOpener::failing(),
    );
    assert!(transport.connect().is_err());
    assert!(transport.connect().is_err());
    assert!(transport.stop());
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_lines_are_delivered_in_order() {
    let (transport, handle, events) =
        connected_mock_transport(SettingsBuilder::new().port(MOCK_PORT).build());

    handle.push_line("CFG:HEX:0001");
    handle.push_line("  padded line\r");
    handle.push_bytes(b"\xfe\xff garbage\n");
    handle.push_line("SND:HEX:abcd");

    let lines = common::collect_lines(&events, 3);
    assert_eq!(lines, vec!["CFG:HEX:0001", "padded line", "SND:HEX:abcd"]);

    let stats = transport.stats();
    assert_eq!(stats.lines_received, 3);
    assert_eq!(stats.decode_errors, 1);
    assert!(transport.is_connected());

    assert!(transport.stop());
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_invalidated_link_reports_fault_in_order() {
    let (transport, handle, events) =
        connected_mock_transport(SettingsBuilder::new().port(MOCK_PORT).build());

    handle.invalidate();

    let seen = common::wait_for_event(
        &events,
        &TransportEvent::LineReceived(CONNECTION_TERMINATED.to_string()),
    )
    .expect("termination sentinel");

    assert_eq!(seen.len(), 3);
    assert!(matches!(seen[0], TransportEvent::Error(_)));
    assert_eq!(seen[1], TransportEvent::StateChanged { connected: false });
    assert_eq!(transport.state(), TransportState::Disconnected);

    // Nothing else follows, and stopping afterwards is harmless
    thread::sleep(Duration::from_millis(20));
    assert!(events.try_recv().is_err());
    assert!(transport.stop());
    assert!(events.try_recv().is_err());
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_stop_is_idempotent() {
    let (transport, _handle, events) =
        connected_mock_transport(SettingsBuilder::new().port(MOCK_PORT).build());

    assert!(transport.stop());
    assert!(transport.stop());

    let seen: Vec<_> = events.try_iter().collect();
    assert_eq!(seen, vec![TransportEvent::StateChanged { connected: false }]);
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_concurrent_sends_are_written_once_in_order() {
    let settings = SettingsBuilder::new().port(MOCK_PORT).build();
    let (transport, handle, _events) = connected_mock_transport(settings.clone());
    let transport = std::sync::Arc::new(transport);

    let producers: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let transport = transport.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    transport.send(format!("{}{}", name, i));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    // Nothing is written until writing is allowed
    thread::sleep(Duration::from_millis(20));
    assert!(handle.written().is_empty());
    assert_eq!(transport.queued(), 150);

    settings.update([(keys::SERIAL_ALLOW_WRITE, json!(true))]);
    assert!(common::eventually(|| handle.written().len() == 150));
    assert_eq!(transport.queued(), 0);

    let written = handle.written_lines();
    for name in ["a", "b", "c"] {
        let mine: Vec<_> = written.iter().filter(|w| w.starts_with(name)).cloned().collect();
        let expected: Vec<_> = (0..50).map(|i| format!("{}{}", name, i)).collect();
        assert_eq!(mine, expected);
    }

    transport.stop();
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_freeze_holds_incoming_data() {
    let settings = SettingsBuilder::new().port(MOCK_PORT).freeze(true).build();
    let (transport, handle, events) = connected_mock_transport(settings.clone());

    handle.push_line("held back");
    thread::sleep(Duration::from_millis(30));
    assert!(events.try_recv().is_err());
    assert!(handle.pending() > 0);

    settings.update([(keys::SERIAL_FREEZE, json!(false))]);
    assert_eq!(common::collect_lines(&events, 1), vec!["held back"]);

    transport.stop();
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_echo_round_trip_with_empty_sends() {
    let settings = SettingsBuilder::new().port(MOCK_PORT).allow_write(true).build();
    let (transport, handle, events) = connected_mock_transport(settings);
    handle.set_echo(true);

    transport.send("");
    transport.send_opt(None);
    transport.send_line("");
    transport.send_line("ping");
    transport.send_line("pong");
    assert_eq!(common::collect_lines(&events, 2), vec!["ping", "pong"]);
    assert_eq!(handle.written(), vec![b"ping\n".to_vec(), b"pong\n".to_vec()]);

    transport.stop();
}

#[test]
#[serial]
#[cfg(feature = "mock-link")]
fn test_drop_stops_worker() {
    let (transport, handle, events) =
        connected_mock_transport(SettingsBuilder::new().port(MOCK_PORT).build());
    drop(transport);

    assert_eq!(
        events.recv_timeout(common::test_timeout()).unwrap(),
        TransportEvent::StateChanged { connected: false }
    );
    // The link is released, later data goes nowhere
    handle.push_line("late");
    thread::sleep(Duration::from_millis(20));
    assert!(events.try_recv().is_err());
}

#[test]
#[serial]
fn test_stop_during_slow_read_escalates_then_joins() {
    let transport = connected_slow_transport(Duration::from_millis(1200));
    let events = transport.events();

    let started = Instant::now();
    assert!(transport.stop());
    let elapsed = started.elapsed();

    assert!(elapsed >= STOP_TIMEOUT, "returned before the worker finished: {:?}", elapsed);
    assert!(elapsed < STOP_TIMEOUT + FORCE_STOP_TIMEOUT, "stop took {:?}", elapsed);
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert!(events
        .try_iter()
        .any(|e| e == TransportEvent::StateChanged { connected: false }));
}

#[test]
#[serial]
fn test_stop_during_stuck_read_is_bounded() {
    let transport = connected_slow_transport(Duration::from_secs(3));
    let events = transport.events();

    let started = Instant::now();
    assert!(transport.stop());
    let elapsed = started.elapsed();
    assert!(
        elapsed < STOP_TIMEOUT + FORCE_STOP_TIMEOUT + Duration::from_millis(250),
        "stop took {:?}",
        elapsed
    );

    // The detached worker still closes the link once its read returns
    let deadline = Instant::now() + Duration::from_secs(4);
    let mut closed = false;
    while !closed && Instant::now() < deadline {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(100)) {
            closed = event == TransportEvent::StateChanged { connected: false };
        }
    }
    assert!(closed);
    assert_eq!(transport.state(), TransportState::Disconnected);
}
