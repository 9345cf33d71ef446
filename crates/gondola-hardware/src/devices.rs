//! Enum wrapper for serial channel dispatch.
//!
//! The controller chooses between the real port and the firmware emulator at
//! startup. [`AnyChannel`] keeps that choice a concrete type so the protocol
//! engine stays monomorphic over one channel type.
//!
//! # Examples
//!
//! ```
//! use gondola_hardware::{AnyChannel, MockChannel, SerialChannel};
//!
//! let (mock, handle) = MockChannel::new();
//! let mut channel = AnyChannel::Mock(mock);
//!
//! handle.push(0);
//! assert_eq!(channel.try_read_int(), Some(0));
//! assert_eq!(channel.kind(), "mock");
//! ```

use crate::mock::MockChannel;
use crate::serial::SerialPortChannel;
use crate::traits::SerialChannel;

/// Serial channel chosen at runtime.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyChannel {
    /// Physical serial port.
    Serial(SerialPortChannel),

    /// Scripted device for development and testing.
    Mock(MockChannel),
}

impl AnyChannel {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serial(_) => "serial",
            Self::Mock(_) => "mock",
        }
    }
}

impl SerialChannel for AnyChannel {
    fn try_read_int(&mut self) -> Option<i64> {
        match self {
            Self::Serial(channel) => channel.try_read_int(),
            Self::Mock(channel) => channel.try_read_int(),
        }
    }

    fn write_int(&mut self, value: i64) -> bool {
        match self {
            Self::Serial(channel) => channel.write_int(value),
            Self::Mock(channel) => channel.write_int(value),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Serial(channel) => channel.is_connected(),
            Self::Mock(channel) => channel.is_connected(),
        }
    }
}

impl From<SerialPortChannel> for AnyChannel {
    fn from(channel: SerialPortChannel) -> Self {
        Self::Serial(channel)
    }
}

impl From<MockChannel> for AnyChannel {
    fn from(channel: MockChannel) -> Self {
        Self::Mock(channel)
    }
}
