//! Transport primitives for the connection manager.
//!
//! [`Connector`] is the seam between the reconnect state machine and the
//! network: [`TcpConnector`] dials the intake over TCP with optional TLS,
//! while tests substitute scripted connectors.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{TlsConnector, TlsStream};

use super::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_INTAKE_HOST, intake_port};

/// Opens new streams on demand.
pub trait Connector: Send + Sync {
    type Stream: LogStream;

    /// Establish a fresh connection.
    fn connect(&self) -> io::Result<Self::Stream>;
}

/// A writable connection owned by the connection manager.
pub trait LogStream: Write + Send {
    /// Handle that can abort a write blocked on another thread.
    ///
    /// Streams that cannot be interrupted return `None`.
    fn interrupt_handle(&self) -> Option<Box<dyn Interrupt>> {
        None
    }
}

/// Aborts in-flight I/O on a stream from another thread.
pub trait Interrupt: Send {
    fn interrupt(&self) -> io::Result<()>;
}

impl Interrupt for TcpStream {
    fn interrupt(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// TCP transport configuration.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsOptions>,
}

impl TcpTransport {
    /// Transport for the intake endpoint, choosing port and TLS from `ssl`.
    pub fn intake(host: impl Into<String>, ssl: bool) -> Self {
        let host = host.into();
        let tls = ssl.then(|| TlsOptions {
            domain: host.clone(),
            insecure_skip_verify: false,
        });
        Self {
            port: intake_port(ssl),
            host,
            tls,
        }
    }

    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::intake(DEFAULT_INTAKE_HOST, true)
    }
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// Active socket connection.
pub enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveConnection {
    fn tcp(&self) -> &TcpStream {
        match self {
            ActiveConnection::PlainTcp(stream) => stream,
            ActiveConnection::Tls(stream) => stream.get_ref(),
        }
    }
}

impl Write for ActiveConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.write(buf),
            ActiveConnection::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
        }
    }
}

impl LogStream for ActiveConnection {
    fn interrupt_handle(&self) -> Option<Box<dyn Interrupt>> {
        let clone = self.tcp().try_clone().ok()?;
        Some(Box::new(clone))
    }
}

/// Dials a [`TcpTransport`].
#[derive(Clone, Debug)]
pub struct TcpConnector {
    pub transport: TcpTransport,
    pub connect_timeout: Duration,
    /// Leave the socket in blocking mode once connected.
    pub blocking: bool,
}

impl TcpConnector {
    pub fn new(transport: TcpTransport) -> Self {
        Self {
            transport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            blocking: false,
        }
    }
}

impl Connector for TcpConnector {
    type Stream = ActiveConnection;

    fn connect(&self) -> io::Result<ActiveConnection> {
        let connection = connect_transport(&self.transport, self.connect_timeout)?;
        connection.tcp().set_nonblocking(!self.blocking)?;
        Ok(connection)
    }
}

fn connect_tcp(config: &TcpTransport, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in config.socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {}:{}", config.host, config.port),
        )
    }))
}

/// Establish a blocking connection using the provided transport definition.
///
/// Both the TCP connect and the TLS handshake are bounded by
/// `connect_timeout`.
pub fn connect_transport(
    config: &TcpTransport,
    connect_timeout: Duration,
) -> io::Result<ActiveConnection> {
    let stream = connect_tcp(config, connect_timeout)?;
    let Some(tls) = &config.tls else {
        return Ok(ActiveConnection::PlainTcp(stream));
    };
    let connector = tls.connector()?;
    stream.set_read_timeout(Some(connect_timeout))?;
    stream.set_write_timeout(Some(connect_timeout))?;
    let stream = connector
        .connect(&tls.domain, stream)
        .map_err(io::Error::other)?;
    let tcp_ref = stream.get_ref();
    tcp_ref.set_read_timeout(None)?;
    tcp_ref.set_write_timeout(None)?;
    Ok(ActiveConnection::Tls(Box::new(stream)))
}
