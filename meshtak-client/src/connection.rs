//! Connection management: serial transport lifecycle and request/response
//! correlation.
//!
//! One background task owns all reading: it polls the port, feeds the frame
//! decoder, and routes every complete frame — to the pending request whose id
//! it answers, or to the event queue. Any number of callers may issue
//! commands concurrently; they only meet the reader through the synchronized
//! pending table.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshtak_protocol::codec::{Decoder, Encoder};
use meshtak_protocol::{Command, CommandFrame, DeviceFrame, DevicePayload, DEFAULT_BAUD_RATE};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::events::EventDispatcher;
use crate::port::{self, SerialIo};

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Minimum read buffer size.
pub const MIN_READ_BUFFER_SIZE: usize = 64;

/// Maximum read buffer size.
pub const MAX_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Bounded wait for the reader task to stop on close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub port_name: String,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Default timeout for commands.
    pub command_timeout: Duration,
    /// How long the reader sleeps when no bytes are available.
    pub poll_interval: Duration,
    /// Read buffer size for port reads.
    pub read_buffer_size: usize,
    /// Capacity of the event handoff queue.
    pub event_queue_capacity: usize,
}

impl ConnectionConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            event_queue_capacity: 64,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }
}

/// Pending-request table.
///
/// Id allocation lives inside the same lock so an id backing an in-flight
/// request can never be handed out again before that request completes or
/// times out, even across the u32 wrap. Id 0 is reserved for unsolicited
/// frames.
struct PendingTable {
    next_id: u32,
    waiting: HashMap<u32, oneshot::Sender<DevicePayload>>,
}

impl PendingTable {
    fn new() -> Self {
        Self {
            next_id: 0,
            waiting: HashMap::new(),
        }
    }

    fn allocate(&mut self) -> u32 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id != 0 && !self.waiting.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }
}

/// State shared between callers and the background reader.
struct Shared {
    config: ConnectionConfig,
    port: Mutex<Option<Box<dyn SerialIo>>>,
    decoder: Mutex<Decoder>,
    pending: Mutex<PendingTable>,
    running: AtomicBool,
    dispatcher: Arc<EventDispatcher>,
    event_tx: Mutex<Option<mpsc::Sender<meshtak_protocol::Event>>>,
}

/// A connection to a TAK radio.
pub struct Connection {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                port: Mutex::new(None),
                decoder: Mutex::new(Decoder::new()),
                pending: Mutex::new(PendingTable::new()),
                running: AtomicBool::new(false),
                dispatcher: Arc::new(EventDispatcher::new()),
                event_tx: Mutex::new(None),
            }),
            reader: Mutex::new(None),
        }
    }

    /// The event dispatcher for this connection.
    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        self.shared.dispatcher.clone()
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().waiting.len()
    }

    /// Opens the configured serial port and starts the background reader.
    /// No-op when already connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }
        let config = &self.shared.config;
        debug!(port = %config.port_name, baud = config.baud_rate, "opening serial port");
        let port = port::open(&config.port_name, config.baud_rate, config.poll_interval)?;
        self.attach(port);
        Ok(())
    }

    /// Like [`connect`](Self::connect) but over a caller-supplied byte
    /// stream (a TCP bridge, a test double). No-op when already connected.
    pub async fn connect_with(&self, port: Box<dyn SerialIo>) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }
        self.attach(port);
        Ok(())
    }

    fn attach(&self, port: Box<dyn SerialIo>) {
        *self.shared.port.lock() = Some(port);
        self.shared.decoder.lock().clear();

        let (tx, mut rx) = mpsc::channel(self.shared.config.event_queue_capacity);
        *self.shared.event_tx.lock() = Some(tx);
        let dispatcher = self.shared.dispatcher.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                dispatcher.dispatch(event);
            }
        });

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = tokio::task::spawn_blocking(move || read_loop(shared));
        *self.reader.lock() = Some(handle);
        debug!("connected");
    }

    /// Closes the connection: stops the reader within a bounded interval,
    /// drops the port, clears the decoder, and fails every still-pending
    /// request with [`ClientError::ConnectionClosed`]. Idempotent.
    pub async fn close(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("closing connection");

        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("reader task did not stop within {:?}", SHUTDOWN_TIMEOUT);
            }
        }

        *self.shared.port.lock() = None;
        self.shared.decoder.lock().clear();
        *self.shared.event_tx.lock() = None;

        let waiting = std::mem::take(&mut self.shared.pending.lock().waiting);
        if !waiting.is_empty() {
            debug!(count = waiting.len(), "failing pending requests on disconnect");
        }
        // Dropping the senders wakes every waiter with ConnectionClosed.
        drop(waiting);
    }

    /// Sends a command and waits for the response that carries its id.
    ///
    /// `timeout` overrides the configured command timeout. On timeout the
    /// pending request is deregistered; a reply arriving later finds no
    /// match and is dropped as unrecognized.
    pub async fn command(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<DevicePayload, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let timeout = timeout.unwrap_or(self.shared.config.command_timeout);

        let (packet_id, rx) = {
            let mut pending = self.shared.pending.lock();
            let id = pending.allocate();
            let (tx, rx) = oneshot::channel();
            pending.waiting.insert(id, tx);
            (id, rx)
        };

        let frame = CommandFrame { packet_id, command };
        debug!(packet_id, command = frame.command.name(), "sending command");

        let result = Encoder::encode_command(&frame)
            .map_err(ClientError::from)
            .and_then(|encoded| self.write_frame(&encoded));
        if let Err(err) = result {
            self.shared.pending.lock().waiting.remove(&packet_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.lock().waiting.remove(&packet_id);
                debug!(packet_id, ?timeout, "command timed out");
                Err(ClientError::Timeout)
            }
        }
    }

    /// Writes one framed envelope. Writers are serialized by the port lock
    /// so concurrent callers never interleave frames on the wire.
    fn write_frame(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut guard = self.shared.port.lock();
        let port = guard.as_mut().ok_or(ClientError::NotConnected)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }
}

impl Drop for Connection {
    // The reader observes the flag within one poll interval, so a connection
    // dropped without close() cannot hold up runtime shutdown.
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

/// Background reading loop: polls the port, reassembles frames, and routes
/// them. Read failures are absorbed with a pause while still connected.
fn read_loop(shared: Arc<Shared>) {
    debug!("reader task started");
    let mut buf = vec![0u8; shared.config.read_buffer_size];
    while shared.running.load(Ordering::SeqCst) {
        let n = match read_available(&shared, &mut buf) {
            Ok(n) => n,
            Err(err) => {
                if shared.running.load(Ordering::SeqCst) {
                    debug!("serial read failed: {err}; retrying");
                    std::thread::sleep(shared.config.poll_interval);
                }
                continue;
            }
        };
        if n == 0 {
            std::thread::sleep(shared.config.poll_interval);
            continue;
        }

        let frames = {
            let mut decoder = shared.decoder.lock();
            decoder.extend(&buf[..n]);
            let mut frames = Vec::new();
            while let Some(frame) = decoder.next_frame() {
                frames.push(frame);
            }
            frames
        };
        for frame in frames {
            handle_frame(&shared, &frame);
        }
    }
    debug!("reader task stopped");
}

fn read_available(shared: &Shared, buf: &mut [u8]) -> io::Result<usize> {
    let mut guard = shared.port.lock();
    let port = match guard.as_mut() {
        Some(port) => port,
        None => return Ok(0),
    };
    if port.bytes_to_read()? == 0 {
        return Ok(0);
    }
    match port.read(buf) {
        Ok(n) => Ok(n),
        Err(err)
            if err.kind() == io::ErrorKind::TimedOut
                || err.kind() == io::ErrorKind::Interrupted =>
        {
            Ok(0)
        }
        Err(err) => Err(err),
    }
}

/// Routes one reassembled frame: to the pending request whose id it answers,
/// or to the event queue. Malformed envelopes are dropped as line noise.
fn handle_frame(shared: &Shared, frame: &[u8]) {
    let packet: DeviceFrame = match serde_json::from_slice(frame) {
        Ok(packet) => packet,
        Err(err) => {
            trace!("dropping malformed envelope: {err}");
            return;
        }
    };

    let waiter = shared.pending.lock().waiting.remove(&packet.request_id);
    if let Some(tx) = waiter {
        trace!(request_id = packet.request_id, "matched response");
        let _ = tx.send(packet.payload);
        return;
    }

    match packet.payload.into_event() {
        Some(event) => {
            let guard = shared.event_tx.lock();
            if let Some(tx) = guard.as_ref() {
                if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
                    warn!(kind = %event.kind(), "event queue full; dropping event");
                }
            }
        }
        None => {
            // Late reply for a request that already timed out, or a response
            // we never asked for. Either way, unrecognized.
            trace!(request_id = packet.request_id, "dropping unmatched response");
        }
    }
}
