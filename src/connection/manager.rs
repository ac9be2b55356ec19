//! The reconnecting connection manager.

use std::{
    io::{self, Write},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use crate::{rate_limited_warner::RateLimitedWarner, wire::message_excerpt};

use super::{
    backoff::BackoffState,
    config::{BackoffPolicy, DEFAULT_WRITE_RETRY_PAUSE, deadline_after},
    transport::{Connector, Interrupt, LogStream, TcpConnector},
};

/// Observable state of a [`ConnectionManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No socket and no pending backoff window.
    Disconnected,
    /// The last connect attempt failed; waiting for the retry time.
    BackoffWait,
    /// A socket is open.
    Connected,
}

/// Reasons [`ConnectionManager::send`] gives up on a payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// [`ConnectionManager::close`] was called before delivery.
    #[error("connection closed before the payload was delivered")]
    Closed,
}

struct ConnectionState<S> {
    stream: Option<S>,
    backoff: BackoffState,
    closed: bool,
}

/// Owns the single outbound socket and its reconnect state machine.
///
/// Writes happen under the state lock, so one payload's bytes are never
/// interleaved with another's. Retry pauses release the lock so
/// [`close`](Self::close) can proceed from another thread.
pub struct ConnectionManager<C: Connector = TcpConnector> {
    connector: C,
    state: Mutex<ConnectionState<C::Stream>>,
    interrupt: Mutex<Option<Box<dyn Interrupt>>>,
    /// Set before `close` takes the state lock so a sender that is about to
    /// reconnect gives up instead.
    closing: AtomicBool,
    wake: Condvar,
    write_retry_pause: Duration,
    warner: RateLimitedWarner,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a disconnected manager. No connection is attempted until the
    /// first [`send`](Self::send).
    pub fn new(connector: C, backoff: BackoffPolicy) -> Self {
        Self {
            connector,
            state: Mutex::new(ConnectionState {
                stream: None,
                backoff: BackoffState::new(backoff),
                closed: false,
            }),
            interrupt: Mutex::new(None),
            closing: AtomicBool::new(false),
            wake: Condvar::new(),
            write_retry_pause: DEFAULT_WRITE_RETRY_PAUSE,
            warner: RateLimitedWarner::default(),
        }
    }

    /// Override the pause between failed write attempts.
    pub fn with_write_retry_pause(mut self, pause: Duration) -> Self {
        self.write_retry_pause = pause;
        self
    }

    /// Replace the warner used for repeated delivery failures.
    pub fn with_warner(mut self, warner: RateLimitedWarner) -> Self {
        self.warner = warner;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn status(&self) -> ConnectionStatus {
        let state = self.state.lock();
        if state.stream.is_some() {
            ConnectionStatus::Connected
        } else if !state.closed && state.backoff.retry_time().is_some() {
            ConnectionStatus::BackoffWait
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Time after which the next connect attempt is permitted, if backing off.
    pub fn retry_time(&self) -> Option<Instant> {
        self.state.lock().backoff.retry_time()
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Write `payload` in full, reconnecting and retrying until it is
    /// delivered.
    ///
    /// There is no attempt limit. While the backoff window is open no connect
    /// is attempted; each failed round waits the write retry pause before
    /// looping.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] once [`close`](Self::close) has been
    /// called, including when it interrupts this call.
    pub fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        let mut state = self.state.lock();
        let mut attempts = 0u64;
        loop {
            if state.closed || self.is_closed() {
                return Err(SendError::Closed);
            }
            if state.stream.is_none() {
                self.try_connect(&mut state);
                if self.is_closed() {
                    return Err(SendError::Closed);
                }
            }
            let outcome = match state.stream.as_mut() {
                Some(stream) => stream.write_all(payload).and_then(|()| stream.flush()),
                None => Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no active connection",
                )),
            };
            let err = match outcome {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            self.discard_stream(&mut state);
            attempts += 1;
            if attempts == 1 {
                warn!(
                    "ddlogging: failed to send log entry: {err}: {}",
                    message_excerpt(payload)
                );
            } else {
                self.warner.record_failure();
                self.warner.warn_if_due(|count| {
                    warn!("ddlogging: {count} further delivery attempts failed; last error: {err}");
                });
            }
            self.pause(&mut state);
        }
    }

    /// Close the socket and stop any pending or future [`send`](Self::send).
    ///
    /// A write blocked on another thread is interrupted. Calling `close`
    /// again is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates an unexpected failure while shutting the socket down.
    pub fn close(&self) -> io::Result<()> {
        self.closing.store(true, Ordering::SeqCst);
        let handle = self.interrupt.lock().take();
        let result = handle.map_or(Ok(()), |handle| handle.interrupt());

        let mut state = self.state.lock();
        state.closed = true;
        if state.stream.take().is_some() {
            debug!("ddlogging: connection closed");
        }
        self.interrupt.lock().take();
        drop(state);
        self.wake.notify_all();
        self.warner.flush(|count| {
            warn!("ddlogging: {count} delivery attempts failed before close");
        });
        result
    }

    fn try_connect(&self, state: &mut ConnectionState<C::Stream>) {
        let now = Instant::now();
        if !state.backoff.may_attempt(now) {
            return;
        }
        match self.connector.connect() {
            Ok(stream) => {
                *self.interrupt.lock() = stream.interrupt_handle();
                state.backoff.record_success();
                if self.is_closed() {
                    self.interrupt.lock().take();
                    return;
                }
                state.stream = Some(stream);
                debug!("ddlogging: connected to log intake");
            }
            Err(err) => {
                let period = state.backoff.record_failure(now);
                warn!("ddlogging: connection attempt failed: {err}; next attempt in {period:?}");
            }
        }
    }

    fn discard_stream(&self, state: &mut ConnectionState<C::Stream>) {
        state.stream = None;
        self.interrupt.lock().take();
    }

    fn pause(&self, state: &mut MutexGuard<'_, ConnectionState<C::Stream>>) {
        let deadline = deadline_after(Instant::now(), self.write_retry_pause);
        while !state.closed && !self.is_closed() {
            if self.wake.wait_until(state, deadline).timed_out() {
                break;
            }
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("write_retry_pause", &self.write_retry_pause)
            .finish()
    }
}
