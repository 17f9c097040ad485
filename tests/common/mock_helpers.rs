//! Mock construction helpers

#[cfg(feature = "mock-link")]
use crossbeam_channel::Receiver;
#[cfg(feature = "mock-link")]
use uart_console::transport::mock_link::{MockLinkHandle, MockOpener};
#[cfg(feature = "mock-link")]
use uart_console::{SerialTransport, SettingsStore, TransportEvent};

/// Label of the port selected by the helpers
pub const MOCK_PORT: &str = "/dev/mock0 - Mock UART";

/// A transport over a mock link, connected, with its first event consumed
#[cfg(feature = "mock-link")]
pub fn connected_mock_transport(
    settings: SettingsStore,
) -> (SerialTransport, MockLinkHandle, Receiver<TransportEvent>) {
    let opener = MockOpener::new();
    let handle = opener.handle();
    let transport = SerialTransport::with_opener(settings, opener);
    let events = transport.events();

    transport.connect().unwrap();
    assert_eq!(
        events.recv_timeout(super::test_timeout()).unwrap(),
        TransportEvent::StateChanged { connected: true }
    );

    (transport, handle, events)
}
