//! # meshtak-client
//!
//! Client library for LoRa mesh TAK radios over a serial link.
//!
//! This crate provides:
//! - A polled serial transport with a single background reading task
//! - Request/response correlation with per-call timeouts
//! - Event dispatch to registered handlers through a bounded queue
//! - Automatic chunking of oversized text messages
//!
//! ```no_run
//! use meshtak_client::{ConnectionConfig, MeshClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), meshtak_client::ClientError> {
//!     let client = MeshClient::new(ConnectionConfig::new("/dev/ttyUSB0"));
//!     client.connect().await?;
//!
//!     let info = client.get_info(None).await?;
//!     println!("connected to {}", info.node_info.node_id);
//!
//!     client.send_message("Hello mesh!", None, false, None).await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod port;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{MeshClient, CHUNK_DELAY, CHUNK_SIZE, MAX_SINGLE_MESSAGE};
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
pub use events::EventDispatcher;
pub use port::SerialIo;
