//! A [`Connector`] that replays a fixed script of outcomes.
//!
//! Each `connect` call pops the next [`Step`]; an exhausted script refuses
//! every further attempt. Streams write into a shared in-memory sink and
//! count how many times they are dropped.

use std::{
    collections::VecDeque,
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc::Receiver,
    },
};

use parking_lot::{Condvar, Mutex};

use crate::connection::{Connector, Interrupt, LogStream};

/// Outcome of one scripted connect attempt.
pub enum Step {
    Refuse,
    Accept(MemoryStream),
    /// Hold inside `connect` until the sender side signals, then accept.
    Held(MemoryStream, Receiver<()>),
}

#[derive(Default)]
struct Gate {
    interrupted: Mutex<bool>,
    cond: Condvar,
    entered: AtomicUsize,
}

struct GateInterrupt(Arc<Gate>);

impl Interrupt for GateInterrupt {
    fn interrupt(&self) -> io::Result<()> {
        *self.0.interrupted.lock() = true;
        self.0.cond.notify_all();
        Ok(())
    }
}

/// In-memory stream recording everything written to it.
pub struct MemoryStream {
    sink: Arc<Mutex<Vec<u8>>>,
    failing_writes: usize,
    gate: Option<Arc<Gate>>,
    drops: Arc<AtomicUsize>,
}

impl MemoryStream {
    /// Stream appending to `sink`.
    pub fn new(sink: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            sink,
            failing_writes: 0,
            gate: None,
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the first `count` writes with `BrokenPipe`.
    pub fn failing(mut self, count: usize) -> Self {
        self.failing_writes = count;
        self
    }

    /// Block every write until the stream is interrupted.
    pub fn blocking(mut self) -> Self {
        self.gate = Some(Arc::new(Gate::default()));
        self
    }

    /// Share a drop counter with the caller.
    pub fn counting_drops(mut self, drops: Arc<AtomicUsize>) -> Self {
        self.drops = drops;
        self
    }

    /// Number of writes that have entered the blocking gate so far.
    pub fn blocked_writers(&self) -> Arc<dyn Fn() -> usize + Send + Sync> {
        let gate = self.gate.clone();
        Arc::new(move || {
            gate.as_ref()
                .map_or(0, |gate| gate.entered.load(Ordering::SeqCst))
        })
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(gate) = &self.gate {
            gate.entered.fetch_add(1, Ordering::SeqCst);
            let mut interrupted = gate.interrupted.lock();
            while !*interrupted {
                gate.cond.wait(&mut interrupted);
            }
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream shut down"));
        }
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        self.sink.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogStream for MemoryStream {
    fn interrupt_handle(&self) -> Option<Box<dyn Interrupt>> {
        self.gate
            .clone()
            .map(|gate| Box::new(GateInterrupt(gate)) as Box<dyn Interrupt>)
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector replaying a script of [`Step`]s.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Step>>>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connector that accepts once, writing into `sink`.
    pub fn accepting(sink: Arc<Mutex<Vec<u8>>>) -> Self {
        Self::new([Step::Accept(MemoryStream::new(sink))])
    }

    /// Total number of connect attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Stream = MemoryStream;

    fn connect(&self) -> io::Result<MemoryStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Accept(stream)) => Ok(stream),
            Some(Step::Held(stream, release)) => {
                let _ = release.recv();
                Ok(stream)
            }
            Some(Step::Refuse) | None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted refusal",
            )),
        }
    }
}
