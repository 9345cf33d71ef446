//! Core constants for the pick-and-place serial protocol.
//!
//! This module collects the numeric vocabulary shared by the host and the
//! microcontroller, the gondola position ids, and the default timing values
//! used by the protocol engine and the identification gate.
//!
//! # Wire Sequence
//!
//! Every value travels as a newline-terminated ASCII integer:
//!
//! ```text
//! handshake:  device 0  -> host 1  -> device 2                 (Idle)
//! pick cycle: host 3    -> device 4 -> host 5 -> device 6
//!             host <position id>    -> device 8
//!             host 9    -> device 10 -> host 11                (SerialAck)
//! ```
//!
//! # Usage
//!
//! ```
//! use gondola_core::constants::*;
//!
//! assert_eq!(DEVICE_HANDSHAKE, 0);
//! assert_eq!(HOST_HANDSHAKE_ACK, 1);
//! assert!(FIRST_POSITION_ID < DEFAULT_POSITION_ID);
//! ```

// ============================================================================
// Device -> Host Signals
// ============================================================================

/// Device announces itself and asks for a handshake.
pub const DEVICE_HANDSHAKE: i64 = 0;

/// Device confirms the handshake; the host may enter Idle.
pub const DEVICE_HANDSHAKE_CONFIRM: i64 = 2;

/// Device is ready to grab the detected object.
pub const DEVICE_READY_TO_GRAB: i64 = 4;

/// Device holds the object and asks which gondola to use.
pub const DEVICE_REQUEST_GONDOLA: i64 = 6;

/// Device arrived at the requested gondola.
pub const DEVICE_AT_GONDOLA: i64 = 8;

/// Device released the object.
pub const DEVICE_DROPPED: i64 = 10;

// ============================================================================
// Host -> Device Commands
// ============================================================================

/// Host acknowledges the handshake request.
pub const HOST_HANDSHAKE_ACK: i64 = 1;

/// Host reports an object on the conveyor.
pub const HOST_OBJECT_PRESENT: i64 = 3;

/// Host confirms the grab once the object is identified.
pub const HOST_CONFIRM_GRAB: i64 = 5;

/// Host allows the device to drop the object.
pub const HOST_PROCEED_DROP: i64 = 9;

/// Host acknowledges the drop; the cycle returns to the handshake ack state.
pub const HOST_DROP_ACK: i64 = 11;

// ============================================================================
// Gondola Positions
// ============================================================================

/// First position id handed out when a registry is seeded from bare labels.
pub const FIRST_POSITION_ID: i64 = 71;

/// Position id sent when a label has no registry entry.
pub const DEFAULT_POSITION_ID: i64 = 76;

/// Canonical labels seeded into a fresh registry, in position order (71..=75).
pub const DEFAULT_GONDOLA_LABELS: [&str; 5] = ["pliers", "screwdriver", "hammer", "wrench", "saw"];

// ============================================================================
// Protocol Engine Timing
// ============================================================================

/// Number of read attempts per guard evaluation.
pub const DEFAULT_READ_ATTEMPTS: u32 = 4;

/// Delay between read attempts in milliseconds.
pub const DEFAULT_READ_DELAY_MS: u64 = 50;

/// Seconds to wait for a tool identification before asking vision to retry.
pub const DEFAULT_AWAIT_TOOL_TIMEOUT_SECS: f64 = 10.0;

/// Re-identification requests issued before aborting back to Idle.
pub const DEFAULT_AWAIT_TOOL_MAX_RETRIES: u32 = 3;

/// Cadence of the polling driver in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// ============================================================================
// Identification Gate
// ============================================================================

/// Minimum classifier confidence for a label to be accepted.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Sliding window length in seconds.
pub const DEFAULT_WINDOW_SECS: f64 = 2.0;

/// Maximum timestamps retained per label.
pub const DEFAULT_WINDOW_CAPACITY: usize = 8;

/// Corroborating observations required inside the window.
pub const DEFAULT_MIN_HITS: usize = 2;

/// Minimum spacing in seconds between two emitted identifications.
pub const DEFAULT_EMIT_INTERVAL_SECS: f64 = 0.8;

// ============================================================================
// Serial Link
// ============================================================================

/// Default serial device path.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Default baud rate of the microcontroller firmware.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read timeout of the serial adapter in milliseconds. Kept short so reads
/// behave as non-blocking from the engine's point of view.
pub const DEFAULT_SERIAL_READ_TIMEOUT_MS: u64 = 10;

/// Longest line accepted from the device before the buffer is discarded.
pub const MAX_LINE_LENGTH: usize = 32;

// ============================================================================
// Status
// ============================================================================

/// Default bind address of the status endpoint.
pub const DEFAULT_STATUS_ADDR: &str = "0.0.0.0:5000";

/// Entries kept in the dashboard log ring.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Label shown when no object is in view.
pub const NO_OBJECT_LABEL: &str = "no object detected";
