//! A local stand-in for the log intake. Accepts connections on an ephemeral
//! port and forwards every received line over a channel so tests can assert
//! on the exact bytes a handler wrote.

use std::{
    io::{BufRead, BufReader},
    net::{SocketAddr, TcpListener},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use ddlogging::DatadogHandlerBuilder;
use rstest::fixture;

/// Listener that reads newline-terminated lines from every connection.
pub struct IntakeListener {
    pub addr: SocketAddr,
    lines: Receiver<String>,
}

impl IntakeListener {
    /// Bind to `addr` and start accepting in the background.
    pub fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let tx = tx.clone();
                thread::spawn(move || {
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else { break };
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Ok(Self { addr, lines })
    }

    /// Wait for the next line, without its trailing newline.
    pub fn next_line(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        self.lines.recv_timeout(timeout)
    }
}

/// Intake listening on an ephemeral loopback port.
#[fixture]
pub fn intake() -> IntakeListener {
    IntakeListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).expect("bind intake listener")
}

/// Builder pointed at `addr` over plaintext TCP.
pub fn plaintext_builder(addr: SocketAddr) -> DatadogHandlerBuilder {
    DatadogHandlerBuilder::new()
        .with_api_key("test-key")
        .with_host("test-host")
        .with_intake_host(addr.ip().to_string())
        .with_port(addr.port())
        .with_ssl(false)
        .with_blocking(true)
        .with_write_retry_pause(Duration::from_millis(50))
}
