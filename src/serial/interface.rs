use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use serialport::{SerialPort, SerialPortType};

use super::{Result, SerialError, SerialPortInfo, Transport};

pub const BAUD_RATE: u32 = 115200;
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: None,
        }
    }

    /// List every serial port the OS reports, with USB details where known
    pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
        let ports = serialport::available_ports()?;
        let mut found = Vec::new();

        for port in ports {
            let info = match port.port_type {
                SerialPortType::UsbPort(usb_info) => SerialPortInfo {
                    port_name: port.port_name,
                    vid: Some(usb_info.vid),
                    pid: Some(usb_info.pid),
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                },
                _ => SerialPortInfo {
                    port_name: port.port_name,
                    vid: None,
                    pid: None,
                    serial_number: None,
                    manufacturer: None,
                    product: None,
                },
            };
            found.push(info);
        }

        Ok(found)
    }

    /// Open the controller's port. The read timeout bounds every single-byte read.
    pub fn connect(&mut self, port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<()> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => SerialError::PortNotFound(port_name.to_string()),
                _ => SerialError::ConnectionFailed(e.to_string()),
            })?;

        self.port = Some(port);
        self.port_name = Some(port_name.to_string());

        log::info!("Connected to pressure controller on {} at {} baud", port_name, baud_rate);
        Ok(())
    }

    /// Disconnect from the current device
    pub fn disconnect(&mut self) {
        if let Some(name) = &self.port_name {
            log::info!("Disconnecting from {}", name);
        }
        self.port = None;
        self.port_name = None;
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(SerialError::NotConnected)
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for SerialInterface {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>> {
        let port = self.port_mut()?;
        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(SerialError::IoError(e)),
        }
    }

    async fn bytes_available(&mut self) -> Result<usize> {
        let port = self.port_mut()?;
        Ok(port.bytes_to_read()? as usize)
    }

    async fn close(&mut self) -> Result<()> {
        self.disconnect();
        Ok(())
    }
}
