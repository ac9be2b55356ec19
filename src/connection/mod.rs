//! Connection management for the log intake.
//!
//! [`ConnectionManager`] owns the single outbound socket. Sends block until
//! the payload is written, reconnecting through an exponential backoff gate
//! and pausing between failed writes. The socket is only ever touched under
//! the manager's lock, and [`ConnectionManager::close`] may be called from
//! another thread to abort a blocked send.

pub(crate) mod backoff;
mod config;
mod manager;
mod transport;


pub use backoff::BackoffState;
pub use config::{
    BackoffPolicy, DEFAULT_CONNECT_TIMEOUT, DEFAULT_INTAKE_HOST, DEFAULT_RETRY_FACTOR,
    DEFAULT_RETRY_MAX, DEFAULT_RETRY_START, DEFAULT_WRITE_RETRY_PAUSE, MAX_CONFIGURED_DELAY,
    PLAINTEXT_PORT, TLS_PORT,
    intake_port,
};
pub use manager::{ConnectionManager, ConnectionStatus, SendError};
pub use transport::{
    ActiveConnection, Connector, Interrupt, LogStream, TcpConnector, TcpTransport, TlsOptions,
    connect_transport,
};
