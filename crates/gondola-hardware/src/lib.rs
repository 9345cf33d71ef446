//! Serial link abstraction for the pick-and-place controller.
//!
//! The protocol engine only needs two operations from the link: read one
//! integer if one is available, and write one integer. [`SerialChannel`]
//! captures that contract so the engine can run against a real serial port
//! ([`SerialPortChannel`]) or a scripted device ([`MockChannel`]).
//!
//! # Contract
//!
//! - `try_read_int` never blocks longer than the port's short read timeout
//!   and returns `None` when no value is available, the line was garbage, or
//!   the link is absent.
//! - `write_int` returns `false` on failure and never panics.
//!
//! # Examples
//!
//! ```
//! use gondola_hardware::{MockChannel, SerialChannel};
//!
//! let (mut channel, handle) = MockChannel::new();
//! handle.push(0);
//!
//! assert_eq!(channel.try_read_int(), Some(0));
//! assert!(channel.write_int(1));
//! assert_eq!(handle.written(), vec![1]);
//! ```

pub mod devices;
pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;

pub use devices::AnyChannel;
pub use error::{ChannelError, Result};
pub use mock::{MockChannel, MockChannelHandle, microcontroller_responder};
pub use serial::SerialPortChannel;
pub use traits::SerialChannel;
