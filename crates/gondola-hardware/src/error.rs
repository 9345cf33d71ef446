//! Error types for the serial link.
//!
//! These errors only surface at the edges (opening a port, a failed write
//! reported to the log). The [`SerialChannel`](crate::SerialChannel) contract
//! itself reports failures as `None` and `false`.

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors that can occur on the serial link.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The port could not be opened.
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The port is not open.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Bytes from the device could not be framed as an integer.
    #[error("Decode error: {0}")]
    Decode(#[from] gondola_core::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Create a new open error.
    pub fn open(port: impl Into<String>, source: serialport::Error) -> Self {
        Self::Open {
            port: port.into(),
            source,
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }
}
