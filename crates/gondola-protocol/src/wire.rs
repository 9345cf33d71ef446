//! Typed vocabulary of the serial pick-and-place protocol.
//!
//! The link carries bare integers. Device signals are even, host commands are
//! odd, and the gondola position ids (71 and up) form the only open-ended
//! host value.
//!
//! # Examples
//!
//! ```
//! use gondola_protocol::{DeviceSignal, HostCommand};
//!
//! assert_eq!(DeviceSignal::try_from(4).unwrap(), DeviceSignal::ReadyToGrab);
//! assert_eq!(HostCommand::ConfirmGrab.code(), 5);
//! assert_eq!(DeviceSignal::ReadyToGrab.expected_reply(), Some(HostCommand::ConfirmGrab));
//! ```

use std::fmt;

use gondola_core::constants::*;
use gondola_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Value sent by the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSignal {
    /// `0`: device is up and asks for a handshake.
    Handshake,

    /// `2`: device accepted the handshake ack.
    HandshakeConfirm,

    /// `4`: arm is positioned and ready to grab.
    ReadyToGrab,

    /// `6`: object is held, device asks for the destination.
    RequestGondola,

    /// `8`: arm reached the destination gondola.
    AtGondola,

    /// `10`: object released.
    Dropped,
}

impl DeviceSignal {
    /// Integer written on the wire.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Handshake => DEVICE_HANDSHAKE,
            Self::HandshakeConfirm => DEVICE_HANDSHAKE_CONFIRM,
            Self::ReadyToGrab => DEVICE_READY_TO_GRAB,
            Self::RequestGondola => DEVICE_REQUEST_GONDOLA,
            Self::AtGondola => DEVICE_AT_GONDOLA,
            Self::Dropped => DEVICE_DROPPED,
        }
    }

    /// Fixed host answer to this signal.
    ///
    /// `RequestGondola` is answered with a position id, `HandshakeConfirm`
    /// needs no answer, so both return `None`.
    #[must_use]
    pub fn expected_reply(self) -> Option<HostCommand> {
        match self {
            Self::Handshake => Some(HostCommand::HandshakeAck),
            Self::ReadyToGrab => Some(HostCommand::ConfirmGrab),
            Self::AtGondola => Some(HostCommand::ProceedDrop),
            Self::Dropped => Some(HostCommand::DropAck),
            Self::HandshakeConfirm | Self::RequestGondola => None,
        }
    }
}

impl TryFrom<i64> for DeviceSignal {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            DEVICE_HANDSHAKE => Ok(Self::Handshake),
            DEVICE_HANDSHAKE_CONFIRM => Ok(Self::HandshakeConfirm),
            DEVICE_READY_TO_GRAB => Ok(Self::ReadyToGrab),
            DEVICE_REQUEST_GONDOLA => Ok(Self::RequestGondola),
            DEVICE_AT_GONDOLA => Ok(Self::AtGondola),
            DEVICE_DROPPED => Ok(Self::Dropped),
            other => Err(Error::UnknownSignal(other)),
        }
    }
}

impl fmt::Display for DeviceSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "Handshake",
            Self::HandshakeConfirm => "HandshakeConfirm",
            Self::ReadyToGrab => "ReadyToGrab",
            Self::RequestGondola => "RequestGondola",
            Self::AtGondola => "AtGondola",
            Self::Dropped => "Dropped",
        };
        write!(f, "{}({})", name, self.code())
    }
}

/// Fixed command sent by the host. Position ids are sent as raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    /// `1`
    HandshakeAck,
    /// `3`
    ObjectPresent,
    /// `5`
    ConfirmGrab,
    /// `9`
    ProceedDrop,
    /// `11`
    DropAck,
}

impl HostCommand {
    /// Integer written on the wire.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::HandshakeAck => HOST_HANDSHAKE_ACK,
            Self::ObjectPresent => HOST_OBJECT_PRESENT,
            Self::ConfirmGrab => HOST_CONFIRM_GRAB,
            Self::ProceedDrop => HOST_PROCEED_DROP,
            Self::DropAck => HOST_DROP_ACK,
        }
    }
}

impl TryFrom<i64> for HostCommand {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            HOST_HANDSHAKE_ACK => Ok(Self::HandshakeAck),
            HOST_OBJECT_PRESENT => Ok(Self::ObjectPresent),
            HOST_CONFIRM_GRAB => Ok(Self::ConfirmGrab),
            HOST_PROCEED_DROP => Ok(Self::ProceedDrop),
            HOST_DROP_ACK => Ok(Self::DropAck),
            other => Err(Error::UnknownSignal(other)),
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HandshakeAck => "HandshakeAck",
            Self::ObjectPresent => "ObjectPresent",
            Self::ConfirmGrab => "ConfirmGrab",
            Self::ProceedDrop => "ProceedDrop",
            Self::DropAck => "DropAck",
        };
        write!(f, "{}({})", name, self.code())
    }
}
