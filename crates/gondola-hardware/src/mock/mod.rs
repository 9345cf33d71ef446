//! Mock device implementations for testing and development.
//!
//! This module provides a simulated microcontroller link that can be
//! scripted programmatically without a physical serial port.

pub mod channel;

pub use channel::{MockChannel, MockChannelHandle, Responder, microcontroller_responder};
