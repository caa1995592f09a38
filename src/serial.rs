// src/serial.rs
use log::{debug, error, info, warn};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::BridgeError;
use crate::types::ConnectMode;

/// Read timeout of the native port; only used to notice cancellation.
const READ_POLL: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 256;
/// Pending bytes without a newline are dropped past this size.
const MAX_LINE: usize = 4096;

/// An opened byte-stream link: one half for writing, one for reading.
pub struct SerialLink {
    pub writer: Box<dyn Write + Send>,
    pub reader: Box<dyn Read + Send>,
}

/// Host capability to list and open serial devices.
pub trait PortOpener {
    fn available_ports(&self) -> Result<Vec<String>, BridgeError>;
    fn open(&self, port: &str, baud_rate: u32) -> Result<SerialLink, BridgeError>;
}

/// `serialport`-backed opener.
pub struct NativePorts;

impl PortOpener for NativePorts {
    fn available_ports(&self) -> Result<Vec<String>, BridgeError> {
        let ports = serialport::available_ports()
            .map_err(|e| BridgeError::Unsupported(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, port: &str, baud_rate: u32) -> Result<SerialLink, BridgeError> {
        let handle = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_POLL)
            .open()?;
        let reader = handle.try_clone()?;
        Ok(SerialLink {
            writer: Box::new(handle),
            reader: Box::new(reader),
        })
    }
}

/// Events produced by the reader thread of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SerialEvent {
    Line { generation: u64, line: String },
    /// The stream finished without being cancelled.
    Ended { generation: u64 },
}

/// Splits a byte stream into trimmed, non-empty lines.
///
/// Ends on end-of-data, on cancellation, or on a read error (logged).
/// Timeouts and interrupts are retried.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    cancel: Arc<AtomicBool>,
    done: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R, cancel: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            cancel,
            done: false,
        }
    }
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return None;
            }
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_owned();
                if line.is_empty() {
                    continue;
                }
                return Some(line);
            }
            if self.done {
                return None;
            }
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    info!("Serial reader closed");
                    self.done = true;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if self.buf.len() > MAX_LINE && !self.buf.contains(&b'\n') {
                        warn!("Discarding {} bytes of serial input without a newline", self.buf.len());
                        self.buf.clear();
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    error!("Error reading from serial port: {e}");
                    self.done = true;
                }
            }
        }
    }
}

struct ReaderHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    fn spawn(
        reader: Box<dyn Read + Send>,
        generation: u64,
        events: Sender<SerialEvent>,
    ) -> Result<Self, BridgeError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let thread = thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || {
                for line in LineReader::new(reader, flag.clone()) {
                    if events.send(SerialEvent::Line { generation, line }).is_err() {
                        return;
                    }
                }
                if !flag.load(Ordering::Relaxed) {
                    events.send(SerialEvent::Ended { generation }).ok();
                }
            })?;
        Ok(Self {
            cancel,
            thread: Some(thread),
        })
    }

    fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Serial reader thread panicked");
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(String),
    Disconnected,
    AlreadyConnected,
}

/// The one serial session of the bridge.
///
/// `Disconnected -> open -> Connected -> close | stream end -> Disconnected`.
/// A failed open leaves the session disconnected.
pub struct SerialSession {
    port: Option<String>,
    writer: Option<Box<dyn Write + Send>>,
    reader: Option<ReaderHandle>,
    generation: u64,
    baud_rate: u32,
    mode: ConnectMode,
}

impl SerialSession {
    pub fn new(baud_rate: u32, mode: ConnectMode) -> Self {
        Self {
            port: None,
            writer: None,
            reader: None,
            generation: 0,
            baud_rate,
            mode,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Opens `port` and starts the reader thread. `None` means no device was
    /// selected.
    pub fn open(
        &mut self,
        port: Option<&str>,
        opener: &dyn PortOpener,
        events: Sender<SerialEvent>,
    ) -> Result<(), BridgeError> {
        if self.is_connected() {
            warn!("Serial session already open");
            return Ok(());
        }
        let port = port.ok_or_else(|| BridgeError::Connection("no serial port selected".into()))?;
        info!("Attempting to connect to {port} at {} baud", self.baud_rate);
        let link = opener.open(port, self.baud_rate)?;
        let generation = self.generation + 1;
        let reader = ReaderHandle::spawn(link.reader, generation, events)
            .map_err(|e| BridgeError::Connection(e.to_string()))?;
        self.generation = generation;
        self.port = Some(port.to_owned());
        self.writer = Some(link.writer);
        self.reader = Some(reader);
        info!("Serial connection established on {port}");
        Ok(())
    }

    /// Connect button semantics: toggles or ignores depending on the mode.
    pub fn request_connect(
        &mut self,
        port: Option<&str>,
        opener: &dyn PortOpener,
        events: Sender<SerialEvent>,
    ) -> Result<ConnectOutcome, BridgeError> {
        if self.is_connected() {
            return Ok(match self.mode {
                ConnectMode::Toggle => {
                    self.close();
                    ConnectOutcome::Disconnected
                }
                ConnectMode::ConnectOnce => {
                    info!("Already connected");
                    ConnectOutcome::AlreadyConnected
                }
            });
        }
        self.open(port, opener, events)?;
        Ok(ConnectOutcome::Connected(
            self.port.clone().unwrap_or_default(),
        ))
    }

    /// Releases reader, writer and port in that order. Safe to repeat.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.cancel();
            info!("Serial reader released");
        }
        if let Some(mut writer) = self.writer.take() {
            match writer.flush() {
                Ok(()) => info!("Serial writer closed"),
                Err(e) => error!("Error closing serial writer: {e}"),
            }
        }
        if let Some(port) = self.port.take() {
            info!("Serial port {port} closed");
        }
    }

    /// Writes and flushes. Errors are logged; returns whether bytes went out.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            info!("Cannot send command: serial not connected");
            return false;
        };
        match writer.write_all(bytes).and_then(|_| writer.flush()) {
            Ok(()) => {
                debug!("Sent serial bytes: {:?}", String::from_utf8_lossy(bytes));
                true
            }
            Err(e) => {
                error!("Error sending serial command: {e}");
                false
            }
        }
    }

    /// Filters reader events of this session. Returns inbound lines; a
    /// stream end of the current session closes it.
    pub fn accept(&mut self, event: SerialEvent) -> Option<String> {
        match event {
            SerialEvent::Line { generation, line }
                if generation == self.generation && self.is_connected() =>
            {
                Some(line)
            }
            SerialEvent::Ended { generation }
                if generation == self.generation && self.is_connected() =>
            {
                info!("Serial stream ended; disconnecting");
                self.close();
                None
            }
            _ => None,
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Never yields data; times out like an idle port.
    struct IdleReader;

    impl Read for IdleReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(Duration::from_millis(2));
            Err(std::io::Error::new(ErrorKind::TimedOut, "idle"))
        }
    }

    /// Fails like an unplugged device.
    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"))
        }
    }

    /// In-memory opener. `inbound: None` gives an idle reader.
    pub(crate) struct MemoryPorts {
        pub written: SharedBuf,
        pub inbound: Option<Vec<u8>>,
        /// Idle instead of ending once `inbound` is consumed.
        pub keep_open: bool,
        pub fail: bool,
        pub broken_writer: bool,
        /// Read error once `inbound` is consumed.
        pub broken_reader: bool,
    }

    impl MemoryPorts {
        pub(crate) fn idle() -> Self {
            Self {
                written: SharedBuf::default(),
                inbound: None,
                keep_open: false,
                fail: false,
                broken_writer: false,
                broken_reader: false,
            }
        }

        pub(crate) fn written(&self) -> Vec<u8> {
            self.written.0.lock().unwrap().clone()
        }
    }

    impl PortOpener for MemoryPorts {
        fn available_ports(&self) -> Result<Vec<String>, BridgeError> {
            Ok(vec!["mem0".into()])
        }

        fn open(&self, port: &str, _baud_rate: u32) -> Result<SerialLink, BridgeError> {
            if self.fail {
                return Err(BridgeError::Connection(format!("{port} is busy")));
            }
            let writer: Box<dyn Write + Send> = if self.broken_writer {
                Box::new(BrokenWriter)
            } else {
                Box::new(self.written.clone())
            };
            let inbound = self.inbound.clone();
            let reader: Box<dyn Read + Send> = match (inbound, self.keep_open, self.broken_reader) {
                (Some(bytes), _, true) => Box::new(Cursor::new(bytes).chain(BrokenReader)),
                (Some(bytes), false, false) => Box::new(Cursor::new(bytes)),
                (Some(bytes), true, false) => Box::new(Cursor::new(bytes).chain(IdleReader)),
                (None, _, true) => Box::new(BrokenReader),
                (None, _, false) => Box::new(IdleReader),
            };
            Ok(SerialLink { writer, reader })
        }
    }

    fn drain_until_end(rx: &Receiver<SerialEvent>) -> Vec<SerialEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            if let Ok(ev) = rx.recv_timeout(Duration::from_millis(50)) {
                let end = matches!(ev, SerialEvent::Ended { .. });
                events.push(ev);
                if end {
                    break;
                }
            }
        }
        events
    }

    #[test]
    fn lines_are_split_trimmed_and_filtered() {
        let cancel = Arc::new(AtomicBool::new(false));
        let data = b"SCORE:1\r\n\n  \nDot position: (3, 4)\nSCO".to_vec();
        let lines: Vec<String> = LineReader::new(Cursor::new(data), cancel).collect();
        assert_eq!(lines, vec!["SCORE:1", "Dot position: (3, 4)"]);
    }

    #[test]
    fn line_split_across_reads() {
        struct Chunks(Vec<&'static [u8]>);
        impl Read for Chunks {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let c = self.0.remove(0);
                buf[..c.len()].copy_from_slice(c);
                Ok(c.len())
            }
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let reader = Chunks(vec![b"GAME_", b"RESET\nLEVEL", b"_UP:2\n"]);
        let lines: Vec<String> = LineReader::new(reader, cancel).collect();
        assert_eq!(lines, vec!["GAME_RESET", "LEVEL_UP:2"]);
    }

    #[test]
    fn read_error_ends_the_stream_quietly() {
        let cancel = Arc::new(AtomicBool::new(false));
        let reader = Cursor::new(b"SCORE:2\n".to_vec()).chain(BrokenReader);
        let mut lines = LineReader::new(reader, cancel);
        assert_eq!(lines.next().as_deref(), Some("SCORE:2"));
        assert_eq!(lines.next(), None);
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn runaway_line_is_discarded() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut data = vec![b'x'; MAX_LINE * 2];
        data.extend_from_slice(b"\nSCORE:4\n");
        let lines: Vec<String> = LineReader::new(Cursor::new(data), cancel).collect();
        assert_eq!(lines.last().map(String::as_str), Some("SCORE:4"));
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE));
    }

    #[test]
    fn cancelled_reader_stops() {
        let cancel = Arc::new(AtomicBool::new(true));
        let mut lines = LineReader::new(Cursor::new(b"SCORE:1\n".to_vec()), cancel);
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn write_while_disconnected_is_noop() {
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        assert!(!session.write(b"U"));
        assert!(!session.is_connected());
    }

    #[test]
    fn close_twice_is_fine() {
        let ports = MemoryPorts::idle();
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx).unwrap();
        session.close();
        assert!(!session.is_connected());
        session.close();
        assert!(!session.is_connected());
        assert_eq!(session.port_name(), None);
    }

    #[test]
    fn failed_open_stays_disconnected() {
        let ports = MemoryPorts {
            fail: true,
            ..MemoryPorts::idle()
        };
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        let err = session.open(Some("mem0"), &ports, tx.clone()).unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
        assert!(!session.is_connected());

        let err = session.open(None, &MemoryPorts::idle(), tx).unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
        assert!(!session.is_connected());
    }

    #[test]
    fn writes_reach_the_port() {
        let ports = MemoryPorts::idle();
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx).unwrap();
        assert!(session.write(b"U"));
        assert!(session.write(b"F"));
        assert_eq!(ports.written(), b"UF");
    }

    #[test]
    fn write_error_keeps_session_open() {
        let ports = MemoryPorts {
            broken_writer: true,
            ..MemoryPorts::idle()
        };
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx).unwrap();
        assert!(!session.write(b"L"));
        assert!(session.is_connected());
        session.close();
        assert!(!session.is_connected());
    }

    #[test]
    fn toggle_mode_disconnects() {
        let ports = MemoryPorts::idle();
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        let first = session.request_connect(Some("mem0"), &ports, tx.clone()).unwrap();
        assert_eq!(first, ConnectOutcome::Connected("mem0".into()));
        let second = session.request_connect(Some("mem0"), &ports, tx).unwrap();
        assert_eq!(second, ConnectOutcome::Disconnected);
        assert!(!session.is_connected());
    }

    #[test]
    fn connect_once_mode_keeps_session() {
        let ports = MemoryPorts::idle();
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::ConnectOnce);
        session.request_connect(Some("mem0"), &ports, tx.clone()).unwrap();
        let second = session.request_connect(Some("mem0"), &ports, tx).unwrap();
        assert_eq!(second, ConnectOutcome::AlreadyConnected);
        assert!(session.is_connected());
    }

    #[test]
    fn inbound_lines_then_stream_end_disconnects() {
        let ports = MemoryPorts {
            inbound: Some(b"SCORE:3\nGAME_OVER:3\n".to_vec()),
            ..MemoryPorts::idle()
        };
        let (tx, rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx).unwrap();

        let mut lines = Vec::new();
        for ev in drain_until_end(&rx) {
            if let Some(line) = session.accept(ev) {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["SCORE:3", "GAME_OVER:3"]);
        assert!(!session.is_connected());
    }

    #[test]
    fn read_error_disconnects_session() {
        let ports = MemoryPorts {
            inbound: Some(b"LEVEL:2\n".to_vec()),
            broken_reader: true,
            ..MemoryPorts::idle()
        };
        let (tx, rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx).unwrap();

        let events = drain_until_end(&rx);
        assert!(matches!(events.last(), Some(SerialEvent::Ended { .. })));
        let lines: Vec<String> = events.into_iter().filter_map(|ev| session.accept(ev)).collect();
        assert_eq!(lines, vec!["LEVEL:2"]);
        assert!(!session.is_connected());
    }

    #[test]
    fn lines_after_close_are_dropped() {
        let ports = MemoryPorts::idle();
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx).unwrap();
        let current = session.generation();
        session.close();
        assert_eq!(
            session.accept(SerialEvent::Line { generation: current, line: "SCORE:9".into() }),
            None
        );
    }

    #[test]
    fn stale_generation_is_ignored() {
        let ports = MemoryPorts::idle();
        let (tx, _rx) = channel();
        let mut session = SerialSession::new(9600, ConnectMode::Toggle);
        session.open(Some("mem0"), &ports, tx.clone()).unwrap();
        session.close();
        session.open(Some("mem0"), &ports, tx).unwrap();
        let old = session.generation() - 1;
        assert_eq!(
            session.accept(SerialEvent::Line { generation: old, line: "SCORE:9".into() }),
            None
        );
        session.accept(SerialEvent::Ended { generation: old });
        assert!(session.is_connected());
    }
}
