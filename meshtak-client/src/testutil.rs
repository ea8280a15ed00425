//! In-memory serial double for driving the full client stack in tests.
//!
//! [`ScriptedPort`] plays the device side of the link: every frame the client
//! writes is decoded and handed to a responder closure, whose replies are
//! queued as inbound bytes for the background reader to pick up.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshtak_protocol::codec::{Decoder, Encoder};
use meshtak_protocol::{slip, CommandFrame, CommandResult, DeviceFrame, DevicePayload};
use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionConfig};
use crate::port::SerialIo;

pub(crate) type Responder = Box<dyn FnMut(CommandFrame) -> Vec<DeviceFrame> + Send>;

struct ScriptedPort {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    sent: Arc<Mutex<Vec<CommandFrame>>>,
    responder: Arc<Mutex<Responder>>,
    decoder: Decoder,
}

impl SerialIo for ScriptedPort {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.inbound.lock().len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock();
        let n = buf.len().min(inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbound.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.decoder.extend(buf);
        while let Some(frame) = self.decoder.next_frame() {
            let command: CommandFrame =
                serde_json::from_slice(&frame).expect("client wrote a malformed frame");
            self.sent.lock().push(command.clone());
            let replies = {
                let mut responder = self.responder.lock();
                (*responder)(command)
            };
            let mut inbound = self.inbound.lock();
            for reply in &replies {
                inbound.extend(Encoder::encode_device(reply).unwrap());
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Test-side handle onto a [`ScriptedPort`].
pub(crate) struct DeviceHandle {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    sent: Arc<Mutex<Vec<CommandFrame>>>,
    responder: Arc<Mutex<Responder>>,
}

impl DeviceHandle {
    /// Queues an unsolicited envelope for the client to read.
    pub fn push_frame(&self, frame: &DeviceFrame) {
        self.inbound
            .lock()
            .extend(Encoder::encode_device(frame).unwrap());
    }

    /// Queues an arbitrary payload, SLIP-framed as-is. Lets tests inject
    /// well-framed garbage.
    pub fn push_raw(&self, payload: &[u8]) {
        self.inbound.lock().extend(slip::encode(payload));
    }

    /// Every command envelope the client has written so far.
    pub fn sent_commands(&self) -> Vec<CommandFrame> {
        self.sent.lock().clone()
    }

    /// Replaces the scripted responder.
    pub fn set_responder(&self, responder: Responder) {
        *self.responder.lock() = responder;
    }
}

/// Builds a scripted port and its test-side handle.
pub(crate) fn scripted_port(responder: Responder) -> (Box<dyn SerialIo>, DeviceHandle) {
    let inbound = Arc::new(Mutex::new(VecDeque::new()));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(Mutex::new(responder));
    let port = ScriptedPort {
        inbound: inbound.clone(),
        sent: sent.clone(),
        responder: responder.clone(),
        decoder: Decoder::new(),
    };
    (
        Box::new(port),
        DeviceHandle {
            inbound,
            sent,
            responder,
        },
    )
}

/// A connected [`Connection`] backed by a scripted port, polled fast enough
/// for tests.
pub(crate) async fn scripted_connection(responder: Responder) -> (Connection, DeviceHandle) {
    let config = ConnectionConfig::new("scripted")
        .with_poll_interval(Duration::from_millis(5))
        .with_command_timeout(Duration::from_secs(2));
    let conn = Connection::new(config);
    let (port, device) = scripted_port(responder);
    conn.connect_with(port).await.unwrap();
    (conn, device)
}

/// Responder that answers every command with a successful result carrying
/// `message`.
pub(crate) fn echo_responder(message: &str) -> Responder {
    let message = message.to_string();
    Box::new(move |cmd: CommandFrame| {
        vec![DeviceFrame {
            request_id: cmd.packet_id,
            payload: DevicePayload::Result(CommandResult {
                success: true,
                message: message.clone(),
            }),
        }]
    })
}

/// Polls `cond` until it holds or `deadline` elapses.
pub(crate) async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
