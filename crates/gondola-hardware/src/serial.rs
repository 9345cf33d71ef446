//! Serial port adapter built on the `serialport` crate.
//!
//! The port is opened with a short read timeout so each read behaves as a
//! poll. Incoming bytes accumulate in a buffer that is framed with
//! [`IntLineCodec`], the same codec used for async streams.

use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;
use gondola_core::config::SerialConfig;
use gondola_protocol::IntLineCodec;
use serialport::SerialPort;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};
use crate::traits::SerialChannel;

const READ_CHUNK: usize = 64;

/// [`SerialChannel`] over a physical serial port.
///
/// A channel may be *detached* (no port open). Reads then return `None` and
/// writes return `false`, which lets the controller start without the device
/// plugged in.
pub struct SerialPortChannel {
    path: String,
    port: Option<Box<dyn SerialPort>>,
    codec: IntLineCodec,
    buffer: BytesMut,
}

impl std::fmt::Debug for SerialPortChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortChannel")
            .field("path", &self.path)
            .field("connected", &self.port.is_some())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl SerialPortChannel {
    /// Open the port described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Open` if the port cannot be opened.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| ChannelError::open(&config.port, e))?;

        info!(port = %config.port, baud = config.baud_rate, "Serial port opened");

        Ok(Self {
            path: config.port.clone(),
            port: Some(port),
            codec: IntLineCodec::new(),
            buffer: BytesMut::with_capacity(READ_CHUNK),
        })
    }

    /// Open the port, or fall back to a detached channel and log the failure.
    pub fn open_or_detached(config: &SerialConfig) -> Self {
        match Self::open(config) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("{}; continuing without a serial link", e);
                Self::detached(&config.port)
            }
        }
    }

    /// A channel with no open port.
    pub fn detached(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            port: None,
            codec: IntLineCodec::new(),
            buffer: BytesMut::new(),
        }
    }

    /// Path of the serial device.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decode one value from bytes already buffered.
    fn decode_buffered(&mut self) -> Result<Option<i64>> {
        Ok(self.codec.decode(&mut self.buffer)?)
    }

    /// Pull whatever the port has into the buffer. Returns the byte count.
    fn fill_buffer(&mut self) -> Result<usize> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ChannelError::disconnected(&self.path))?;

        let mut chunk = [0u8; READ_CHUNK];
        match port.read(&mut chunk) {
            Ok(n) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read_value(&mut self) -> Result<Option<i64>> {
        if let Some(value) = self.decode_buffered()? {
            return Ok(Some(value));
        }
        if self.fill_buffer()? == 0 {
            return Ok(None);
        }
        self.decode_buffered()
    }

    fn send(&mut self, value: i64) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| ChannelError::disconnected(&self.path))?;

        let mut out = BytesMut::new();
        self.codec.encode(value, &mut out)?;
        port.write_all(&out)?;
        port.flush()?;
        Ok(())
    }
}

impl SerialChannel for SerialPortChannel {
    fn try_read_int(&mut self) -> Option<i64> {
        match self.read_value() {
            Ok(Some(value)) => {
                debug!(port = %self.path, value, "Received");
                Some(value)
            }
            Ok(None) => None,
            Err(ChannelError::Disconnected { .. }) => None,
            Err(e) => {
                warn!(port = %self.path, "Serial read failed: {}", e);
                None
            }
        }
    }

    fn write_int(&mut self, value: i64) -> bool {
        match self.send(value) {
            Ok(()) => {
                debug!(port = %self.path, value, "Sent");
                true
            }
            Err(e) => {
                warn!(port = %self.path, value, "Serial write failed: {}", e);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
