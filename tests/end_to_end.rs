//! End-to-end delivery against a local TCP intake.

mod test_utils;

use std::{
    io::Read,
    net::{SocketAddr, TcpListener},
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use ddlogging::{
    ConnectionStatus, DatadogHandler, EmitError, Level, LogRecord, MessageFormatter, SendError,
};
use rstest::rstest;
use serde_json::Value;

use test_utils::{IntakeListener, intake, plaintext_builder};

const WAIT: Duration = Duration::from_secs(5);

fn parse_line(line: &str) -> (&str, Value) {
    let (key, body) = line.split_once(' ').expect("api key prefix");
    (key, serde_json::from_str(body).expect("json body"))
}

#[rstest]
fn emitted_records_arrive_as_wire_lines(intake: IntakeListener) {
    let handler = plaintext_builder(intake.addr)
        .with_service("checkout")
        .build()
        .expect("valid config");

    handler.emit(&LogRecord::new("shop.cart", Level::Info, "item added").with_key_value("sku", "A-1"));
    handler.emit(&LogRecord::new("shop.cart", Level::Critical, "checkout failed"));

    let first = intake.next_line(WAIT).expect("first line");
    let second = intake.next_line(WAIT).expect("second line");
    handler.close().expect("close");

    let (key, body) = parse_line(&first);
    assert_eq!(key, "test-key");
    assert_eq!(body["msg"], "item added");
    assert_eq!(body["sku"], "A-1");
    assert_eq!(body["service"], "checkout");
    assert_eq!(body["host"], "test-host");
    assert_eq!(body["status"], "info");

    let (_, body) = parse_line(&second);
    assert_eq!(body["msg"], "checkout failed");
    assert_eq!(body["status"], "error");
    assert_eq!(body["levelname"], "CRITICAL");
}

#[rstest]
fn non_blocking_socket_delivers_small_record_intact(intake: IntakeListener) {
    let handler = plaintext_builder(intake.addr)
        .with_blocking(false)
        .build()
        .expect("valid config");

    handler
        .try_emit(&LogRecord::new("app", Level::Info, "naïve café"))
        .expect("delivered");

    let line = intake.next_line(WAIT).expect("line");
    handler.close().expect("close");

    let (key, body) = parse_line(&line);
    assert_eq!(key, "test-key");
    assert_eq!(body["msg"], "naïve café");
    assert_eq!(body["status"], "info");
}

#[rstest]
fn one_connection_is_reused(intake: IntakeListener) {
    let handler = plaintext_builder(intake.addr)
        .with_formatter(MessageFormatter)
        .build()
        .expect("valid config");

    for n in 0..5 {
        handler.emit(&LogRecord::new("app", Level::Info, &format!("event {n}")));
    }

    for n in 0..5 {
        let line = intake.next_line(WAIT).expect("line");
        assert_eq!(parse_line(&line).1["message"], format!("event {n}"));
    }
    assert_eq!(handler.connection().status(), ConnectionStatus::Connected);
    handler.close().expect("close");
}

#[rstest]
fn delivery_resumes_once_intake_comes_up() {
    // Reserve a port, then release it so the first connects are refused.
    let addr = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .and_then(|listener| listener.local_addr())
        .expect("reserve port");
    let handler = Arc::new(
        plaintext_builder(addr)
            .with_retry_start(0.05)
            .with_retry_max(0.1)
            .build()
            .expect("valid config"),
    );

    let worker = Arc::clone(&handler);
    let sender = thread::spawn(move || {
        worker.try_emit(&LogRecord::new("app", Level::Warning, "queued while down"))
    });

    thread::sleep(Duration::from_millis(200));
    assert_eq!(handler.connection().status(), ConnectionStatus::BackoffWait);

    let intake = IntakeListener::bind(addr).expect("rebind reserved port");
    sender
        .join()
        .expect("sender thread")
        .expect("delivered after reconnect");

    let line = intake.next_line(WAIT).expect("line");
    assert_eq!(parse_line(&line).1["msg"], "queued while down");
    handler.close().expect("close");
}

#[rstest]
fn close_aborts_send_blocked_on_full_socket() {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (accepted_tx, accepted_rx) = mpsc::channel();
    thread::spawn(move || {
        // Accept but never read, so the client's send buffer fills up.
        let (mut stream, _) = listener.accept().expect("accept");
        accepted_tx.send(()).expect("signal accepted");
        thread::sleep(Duration::from_secs(10));
        let _ = stream.read(&mut [0; 1]);
    });

    let handler: Arc<DatadogHandler> = Arc::new(
        plaintext_builder(addr)
            .with_formatter(MessageFormatter)
            .with_write_retry_pause(Duration::from_secs(30))
            .build()
            .expect("valid config"),
    );
    let worker = Arc::clone(&handler);
    let sender = thread::spawn(move || {
        let chunk = "x".repeat(1 << 20);
        loop {
            if let Err(err) = worker.try_emit(&LogRecord::new("app", Level::Info, &chunk)) {
                return err;
            }
        }
    });

    accepted_rx.recv_timeout(WAIT).expect("connection accepted");
    thread::sleep(Duration::from_millis(500));
    handler.close().expect("close");

    let err = sender.join().expect("sender thread");
    assert!(matches!(err, EmitError::Send(SendError::Closed)), "{err}");
    assert_eq!(handler.connection().status(), ConnectionStatus::Disconnected);
}
