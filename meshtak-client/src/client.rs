//! High-level client API.

use std::sync::Arc;
use std::time::Duration;

use meshtak_protocol::{
    Command, DeviceInfo, DevicePayload, DeviceStats, EmergencyReceived, EmergencyType,
    GpsCoordinate, GpsReceived, GpsStatus, LogMessage, MessagePriority, MessageReceived,
    NeighborChanged, NodeInfo, RosterEntry, RouteEntry,
};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use crate::events::EventDispatcher;
use crate::port::SerialIo;

/// Longest text the firmware accepts in a single send.
pub const MAX_SINGLE_MESSAGE: usize = 180;

/// Chunk size for auto-split messages, leaving room for the part label.
pub const CHUNK_SIZE: usize = 160;

/// Pause between consecutive chunk sends.
pub const CHUNK_DELAY: Duration = Duration::from_millis(300);

/// High-level client for LoRa mesh TAK radios.
///
/// ```no_run
/// # use meshtak_client::{ConnectionConfig, MeshClient};
/// # async fn run() -> Result<(), meshtak_client::ClientError> {
/// let client = MeshClient::new(ConnectionConfig::new("/dev/ttyUSB0"));
/// client.connect().await?;
/// client.on_message(|msg| println!("{}: {}", msg.source, msg.text));
/// let neighbors = client.get_neighbors(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct MeshClient {
    conn: Arc<Connection>,
    dispatcher: Arc<EventDispatcher>,
}

impl MeshClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        let conn = Arc::new(Connection::new(config));
        let dispatcher = conn.dispatcher();
        Self { conn, dispatcher }
    }

    /// Opens the configured serial port. No-op when already connected.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Connects over a caller-supplied byte stream instead of the configured
    /// serial port.
    pub async fn connect_with(&self, port: Box<dyn SerialIo>) -> Result<(), ClientError> {
        self.conn.connect_with(port).await
    }

    /// Closes the connection. Idempotent.
    pub async fn disconnect(&self) {
        self.conn.close().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// The underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    // =========================================================================
    // Event handlers
    // =========================================================================

    /// Sets the handler for received text messages.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(MessageReceived) + Send + Sync + 'static,
    {
        self.dispatcher.set_message(Some(Arc::new(handler)));
    }

    pub fn clear_on_message(&self) {
        self.dispatcher.set_message(None);
    }

    /// Sets the handler for position broadcasts from other nodes.
    pub fn on_gps<F>(&self, handler: F)
    where
        F: Fn(GpsReceived) + Send + Sync + 'static,
    {
        self.dispatcher.set_gps(Some(Arc::new(handler)));
    }

    pub fn clear_on_gps(&self) {
        self.dispatcher.set_gps(None);
    }

    /// Sets the handler for neighbor-set changes.
    pub fn on_neighbor<F>(&self, handler: F)
    where
        F: Fn(NeighborChanged) + Send + Sync + 'static,
    {
        self.dispatcher.set_neighbor(Some(Arc::new(handler)));
    }

    pub fn clear_on_neighbor(&self) {
        self.dispatcher.set_neighbor(None);
    }

    /// Sets the handler for emergency alerts.
    pub fn on_emergency<F>(&self, handler: F)
    where
        F: Fn(EmergencyReceived) + Send + Sync + 'static,
    {
        self.dispatcher.set_emergency(Some(Arc::new(handler)));
    }

    pub fn clear_on_emergency(&self) {
        self.dispatcher.set_emergency(None);
    }

    /// Sets the handler for firmware log lines.
    pub fn on_log<F>(&self, handler: F)
    where
        F: Fn(LogMessage) + Send + Sync + 'static,
    {
        self.dispatcher.set_log(Some(Arc::new(handler)));
    }

    pub fn clear_on_log(&self) {
        self.dispatcher.set_log(None);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Sends an action command and returns the device's success flag.
    async fn action(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<bool, ClientError> {
        match self.conn.command(command, timeout).await? {
            DevicePayload::Result(result) => Ok(result.success),
            other => Err(unexpected("result", other)),
        }
    }

    // =========================================================================
    // Query commands
    // =========================================================================

    /// Gets device identity, firmware version, and mesh summary.
    pub async fn get_info(&self, timeout: Option<Duration>) -> Result<DeviceInfo, ClientError> {
        match self.conn.command(Command::GetInfo {}, timeout).await? {
            DevicePayload::Info(info) => Ok(info),
            other => Err(unexpected("info", other)),
        }
    }

    /// Gets the current GPS fix.
    pub async fn get_gps(&self, timeout: Option<Duration>) -> Result<GpsStatus, ClientError> {
        match self.conn.command(Command::GetGps {}, timeout).await? {
            DevicePayload::Gps(gps) => Ok(gps),
            other => Err(unexpected("gps", other)),
        }
    }

    /// Gets the directly connected neighbor nodes.
    pub async fn get_neighbors(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<NodeInfo>, ClientError> {
        match self.conn.command(Command::GetNeighbors {}, timeout).await? {
            DevicePayload::Neighbors(list) => Ok(list.neighbors),
            other => Err(unexpected("neighbors", other)),
        }
    }

    /// Gets the routing table.
    pub async fn get_routes(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<RouteEntry>, ClientError> {
        match self.conn.command(Command::GetRoutes {}, timeout).await? {
            DevicePayload::Routes(list) => Ok(list.routes),
            other => Err(unexpected("routes", other)),
        }
    }

    /// Gets the team roster.
    pub async fn get_roster(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<RosterEntry>, ClientError> {
        match self.conn.command(Command::GetRoster {}, timeout).await? {
            DevicePayload::Roster(list) => Ok(list.roster),
            other => Err(unexpected("roster", other)),
        }
    }

    /// Gets message counters and uptime.
    pub async fn get_stats(&self, timeout: Option<Duration>) -> Result<DeviceStats, ClientError> {
        match self.conn.command(Command::GetStats {}, timeout).await? {
            DevicePayload::Stats(stats) => Ok(stats),
            other => Err(unexpected("stats", other)),
        }
    }

    // =========================================================================
    // Configuration commands
    // =========================================================================

    /// Sets the GPS position manually. With `use_static` the position
    /// persists across device reboots.
    pub async fn set_gps(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        use_static: bool,
        timeout: Option<Duration>,
    ) -> Result<bool, ClientError> {
        self.action(
            Command::SetGps {
                position: GpsCoordinate::new(latitude, longitude, altitude),
                use_static,
            },
            timeout,
        )
        .await
    }

    /// Sets the node ID. The device may require a restart afterwards.
    pub async fn set_node_id(
        &self,
        node_id: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, ClientError> {
        self.action(
            Command::SetNodeId {
                node_id: node_id.to_string(),
            },
            timeout,
        )
        .await
    }

    // =========================================================================
    // Action commands
    // =========================================================================

    /// Sends a text message to the mesh. All messages are broadcast; the
    /// mesh protocol handles routing and delivery.
    ///
    /// Texts over [`MAX_SINGLE_MESSAGE`] chars fail with
    /// [`ClientError::MessageTooLong`] unless `auto_split` is set, in which
    /// case they are sent as labeled `[i/N]` chunks of [`CHUNK_SIZE`] chars
    /// with [`CHUNK_DELAY`] between consecutive sends. The first failed chunk
    /// aborts the remainder.
    pub async fn send_message(
        &self,
        text: &str,
        priority: Option<MessagePriority>,
        auto_split: bool,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        let length = text.chars().count();
        if length <= MAX_SINGLE_MESSAGE {
            return self.send_text(text.to_string(), priority, timeout).await;
        }
        if !auto_split {
            return Err(ClientError::MessageTooLong {
                length,
                max: MAX_SINGLE_MESSAGE,
            });
        }

        let chars: Vec<char> = text.chars().collect();
        let total = chars.len().div_ceil(CHUNK_SIZE);
        for (index, chunk) in chars.chunks(CHUNK_SIZE).enumerate() {
            let mut part = format!("[{}/{}] ", index + 1, total);
            part.extend(chunk.iter());
            self.send_text(part, priority, timeout).await?;
            if index + 1 < total {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
        }
        Ok(())
    }

    /// Sends a message to the mesh. Alias for
    /// [`send_message`](Self::send_message) without auto-split.
    pub async fn broadcast(&self, text: &str, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.send_message(text, None, false, timeout).await
    }

    async fn send_text(
        &self,
        text: String,
        priority: Option<MessagePriority>,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.conn
            .command(
                Command::SendMessage {
                    destination: String::new(),
                    text,
                    priority,
                },
                timeout,
            )
            .await?;
        Ok(())
    }

    /// Broadcasts the current GPS position.
    pub async fn send_gps(&self, timeout: Option<Duration>) -> Result<bool, ClientError> {
        self.action(Command::SendGps {}, timeout).await
    }

    /// Sends an emergency alert.
    pub async fn send_emergency(
        &self,
        emergency_type: EmergencyType,
        description: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, ClientError> {
        self.action(
            Command::SendEmergency {
                emergency_type,
                description: description.to_string(),
            },
            timeout,
        )
        .await
    }

    /// Pings a destination node.
    pub async fn ping(
        &self,
        destination: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, ClientError> {
        self.action(
            Command::Ping {
                destination: destination.to_string(),
            },
            timeout,
        )
        .await
    }

    /// Triggers network discovery.
    pub async fn discover(&self, timeout: Option<Duration>) -> Result<bool, ClientError> {
        self.action(Command::Discover {}, timeout).await
    }

    /// Joins the mesh network.
    pub async fn join(&self, timeout: Option<Duration>) -> Result<bool, ClientError> {
        self.action(Command::Join {}, timeout).await
    }
}

fn unexpected(expected: &'static str, got: DevicePayload) -> ClientError {
    ClientError::UnexpectedResponse {
        expected,
        got: got.name(),
    }
}
