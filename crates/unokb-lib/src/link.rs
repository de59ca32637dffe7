//! Serial link to the keypad: trait + `serialport` backend.
//!
//! [`Connector::connect`] waits for the hardware: it polls once per
//! [`OPEN_POLL_INTERVAL`] until the device node exists and opens, forever, or
//! until a stop is requested. Once open, every I/O failure is a [`LinkError`].

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ── Error type ──

/// Serial link errors.
///
/// String payloads follow the convention **"context: details"**.
#[derive(Debug)]
pub enum LinkError {
    OpenFailed(String),
    ReadFailed(String),
    WriteFailed(String),
    /// The link was used after `close()` or the device hung up.
    Closed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::OpenFailed(e) => write!(f, "Failed to open serial port: {e}"),
            LinkError::ReadFailed(e) => write!(f, "Serial read failed: {e}"),
            LinkError::WriteFailed(e) => write!(f, "Serial write failed: {e}"),
            LinkError::Closed => write!(f, "Serial link closed"),
        }
    }
}

impl std::error::Error for LinkError {}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Delay between hardware presence checks while waiting for the device.
pub const OPEN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a single read waits before giving the caller a chance to stop.
pub const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Longest unterminated input kept while waiting for `\n`. Anything longer is
/// dropped, up to and including the next terminator.
pub const MAX_LINE_LEN: usize = 1024;

// ── Traits ──

/// An open, line-oriented serial connection.
pub trait SerialLink {
    /// Read the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` if no full line arrived within the read timeout.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Write raw bytes.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Close the link. Idempotent.
    fn close(&mut self);
}

/// Opens links, waiting for the hardware if needed.
pub trait Connector {
    type Link: SerialLink;

    /// Block until a link is open. Returns `None` only if `running` was
    /// cleared while waiting.
    fn connect(&mut self, running: &AtomicBool) -> Option<Self::Link>;
}

// ── serialport backend ──

/// Opens the configured device with the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    path: PathBuf,
    baud_rate: u32,
    poll_interval: Duration,
}

impl SerialPortConnector {
    pub fn new(path: impl Into<PathBuf>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            poll_interval: OPEN_POLL_INTERVAL,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One open attempt, no waiting.
    pub fn try_open(&self) -> Result<SerialPortLink> {
        let mut port = serialport::new(self.path.to_string_lossy(), self.baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(|e| LinkError::OpenFailed(format!("{}: {e}", self.path.display())))?;
        // Keep DTR low so opening the port does not reset the board.
        if let Err(e) = port.write_data_terminal_ready(false) {
            log::debug!("could not clear DTR on {}: {e}", self.path.display());
        }
        Ok(SerialPortLink::new(port))
    }
}

impl Connector for SerialPortConnector {
    type Link = SerialPortLink;

    fn connect(&mut self, running: &AtomicBool) -> Option<SerialPortLink> {
        let mut announced = false;
        while running.load(Ordering::SeqCst) {
            std::thread::sleep(self.poll_interval);
            if !self.path.exists() {
                if !announced {
                    log::info!("waiting for {} to appear", self.path.display());
                    announced = true;
                }
                continue;
            }
            match self.try_open() {
                Ok(link) => {
                    log::info!("connected to {}", self.path.display());
                    return Some(link);
                }
                Err(e) => log::debug!("{e} (retrying)"),
            }
        }
        None
    }
}

/// Line reader/writer over any byte stream with read timeouts.
///
/// Bytes are buffered until `\n`; the line is decoded as lossy UTF-8 and
/// trailing whitespace (including `\r`) is stripped. At most
/// [`MAX_LINE_LEN`] unterminated bytes are buffered.
pub struct StreamLink<S> {
    stream: Option<S>,
    pending: Vec<u8>,
    /// Set after an oversized run was dropped; its tail is skipped too.
    discarding: bool,
}

/// The production link type.
pub type SerialPortLink = StreamLink<Box<dyn serialport::SerialPort>>;

impl<S: Read + Write> StreamLink<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            pending: Vec::new(),
            discarding: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        loop {
            let end = self.pending.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            return Some(String::from_utf8_lossy(&line).trim_end().to_string());
        }
    }
}

impl<S: Read + Write> SerialLink for StreamLink<S> {
    fn read_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }
        let stream = self.stream.as_mut().ok_or(LinkError::Closed)?;
        let mut buf = [0u8; 256];
        match stream.read(&mut buf) {
            Ok(0) => Err(LinkError::Closed),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                let line = self.take_line();
                if line.is_none() && self.pending.len() > MAX_LINE_LEN {
                    log::warn!(
                        "dropping {} bytes of serial input with no line terminator",
                        self.pending.len()
                    );
                    self.pending.clear();
                    self.discarding = true;
                }
                Ok(line)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(LinkError::ReadFailed(e.to_string())),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(LinkError::Closed)?;
        stream
            .write_all(bytes)
            .and_then(|()| stream.flush())
            .map_err(|e| LinkError::WriteFailed(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        self.stream = None;
        self.pending.clear();
        self.discarding = false;
    }
}

// ── Mock link for testing ──

/// In-memory link and connector for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// One scripted inbound event.
    #[derive(Debug)]
    pub enum Incoming {
        Line(String),
        /// A read that times out with no data.
        Idle,
        /// A read that fails as if the cable was pulled.
        Fail,
    }

    /// State shared between a [`MockLink`] and the test that owns it.
    ///
    /// Reads pop from `incoming`; an exhausted script reports `Idle` and clears
    /// `running` so the loop under test winds down.
    #[derive(Debug, Default)]
    pub struct MockWire {
        pub incoming: RefCell<VecDeque<Incoming>>,
        pub written: RefCell<Vec<u8>>,
        pub closes: Cell<usize>,
        pub fail_writes: Cell<bool>,
    }

    impl MockWire {
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        pub fn push_line(&self, line: &str) {
            self.incoming
                .borrow_mut()
                .push_back(Incoming::Line(line.to_string()));
        }

        pub fn push(&self, event: Incoming) {
            self.incoming.borrow_mut().push_back(event);
        }

        pub fn written(&self) -> Vec<u8> {
            self.written.borrow().clone()
        }
    }

    pub struct MockLink {
        wire: Rc<MockWire>,
        open: bool,
        stop_when_drained: Option<Rc<AtomicBool>>,
    }

    impl MockLink {
        pub fn new(wire: Rc<MockWire>) -> Self {
            Self {
                wire,
                open: true,
                stop_when_drained: None,
            }
        }

        /// Clear `running` once the scripted input is exhausted.
        pub fn stop_when_drained(mut self, running: Rc<AtomicBool>) -> Self {
            self.stop_when_drained = Some(running);
            self
        }
    }

    impl SerialLink for MockLink {
        fn read_line(&mut self) -> Result<Option<String>> {
            if !self.open {
                return Err(LinkError::Closed);
            }
            match self.wire.incoming.borrow_mut().pop_front() {
                Some(Incoming::Line(l)) => Ok(Some(l)),
                Some(Incoming::Idle) => Ok(None),
                Some(Incoming::Fail) => Err(LinkError::ReadFailed("mock: unplugged".into())),
                None => {
                    if let Some(running) = &self.stop_when_drained {
                        running.store(false, Ordering::SeqCst);
                    }
                    Ok(None)
                }
            }
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            if !self.open {
                return Err(LinkError::Closed);
            }
            if self.wire.fail_writes.get() {
                return Err(LinkError::WriteFailed("mock: write failure injected".into()));
            }
            self.wire.written.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.wire.closes.set(self.wire.closes.get() + 1);
            }
        }
    }

    /// Hands out pre-built links in order; returns `None` when out of links.
    pub struct MockConnector {
        links: VecDeque<MockLink>,
        pub connects: Rc<Cell<usize>>,
    }

    impl MockConnector {
        pub fn new(links: Vec<MockLink>) -> Self {
            Self {
                links: links.into(),
                connects: Rc::new(Cell::new(0)),
            }
        }
    }

    impl Connector for MockConnector {
        type Link = MockLink;

        fn connect(&mut self, running: &AtomicBool) -> Option<MockLink> {
            self.connects.set(self.connects.get() + 1);
            if !running.load(Ordering::SeqCst) {
                return None;
            }
            self.links.pop_front()
        }
    }
}
