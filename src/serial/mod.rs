pub mod interface;
pub mod scripted;

pub use interface::SerialInterface;
pub use scripted::ScriptedTransport;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Byte-oriented duplex channel to the grid controller.
///
/// Every `read_byte` call is bounded by the transport's read timeout and
/// returns `Ok(None)` when nothing arrived in time.
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    async fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Number of bytes that can be read without waiting.
    async fn bytes_available(&mut self) -> Result<usize>;

    /// Release the underlying channel. Calling it twice is harmless.
    async fn close(&mut self) -> Result<()>;
}
