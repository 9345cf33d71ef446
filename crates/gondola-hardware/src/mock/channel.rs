//! Mock serial channel for testing and development.
//!
//! The channel and its handle share one state: the handle queues values the
//! "device" sends and inspects what the host wrote. A responder closure can be
//! installed to answer host writes automatically, which turns the mock into a
//! small firmware emulator.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use gondola_core::constants::FIRST_POSITION_ID;
use gondola_protocol::{DeviceSignal, HostCommand};
use parking_lot::Mutex;
use tracing::trace;

use crate::traits::SerialChannel;

/// Reply function: given a host write, optionally return the device's answer.
pub type Responder = Box<dyn FnMut(i64) -> Option<i64> + Send>;

#[derive(Default)]
struct MockState {
    incoming: VecDeque<i64>,
    written: Vec<i64>,
    fail_writes: bool,
    disconnected: bool,
    reads: usize,
    responder: Option<Responder>,
}

/// Mock serial channel.
///
/// # Examples
///
/// ```
/// use gondola_hardware::{MockChannel, SerialChannel, microcontroller_responder};
///
/// let (mut channel, handle) = MockChannel::new();
/// handle.set_responder(microcontroller_responder());
///
/// assert!(channel.write_int(3));
/// assert_eq!(channel.try_read_int(), Some(4));
/// assert_eq!(handle.written(), vec![3]);
/// ```
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    name: String,
}

impl MockChannel {
    /// Create a new mock channel with the default name.
    ///
    /// Returns a tuple of (MockChannel, MockChannelHandle) where the handle
    /// scripts the device side.
    pub fn new() -> (Self, MockChannelHandle) {
        Self::with_name("Mock Microcontroller")
    }

    /// Create a new mock channel with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockChannelHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let channel = Self {
            state: Arc::clone(&state),
            name: name.into(),
        };
        (channel, MockChannelHandle { state })
    }

    /// Device name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for MockChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockChannel")
            .field("name", &self.name)
            .field("pending", &state.incoming.len())
            .field("written", &state.written)
            .finish()
    }
}

impl SerialChannel for MockChannel {
    fn try_read_int(&mut self) -> Option<i64> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.disconnected {
            return None;
        }
        let value = state.incoming.pop_front();
        trace!(device = %self.name, ?value, "Mock read");
        value
    }

    fn write_int(&mut self, value: i64) -> bool {
        let mut state = self.state.lock();
        if state.disconnected || state.fail_writes {
            trace!(device = %self.name, value, "Mock write rejected");
            return false;
        }
        state.written.push(value);

        let reply = state.responder.as_mut().and_then(|respond| respond(value));
        if let Some(reply) = reply {
            state.incoming.push_back(reply);
        }
        true
    }

    fn is_connected(&self) -> bool {
        !self.state.lock().disconnected
    }
}

/// Handle for scripting a mock channel. Cheap to clone.
#[derive(Clone)]
pub struct MockChannelHandle {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockChannelHandle").finish_non_exhaustive()
    }
}

impl MockChannelHandle {
    /// Queue a value as if the device had sent it.
    pub fn push(&self, value: i64) {
        self.state.lock().incoming.push_back(value);
    }

    /// Queue several values in order.
    pub fn push_all(&self, values: impl IntoIterator<Item = i64>) {
        self.state.lock().incoming.extend(values);
    }

    /// Values written by the host so far, in order.
    pub fn written(&self) -> Vec<i64> {
        self.state.lock().written.clone()
    }

    /// Forget recorded writes.
    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    /// Number of values still queued for the host.
    pub fn pending(&self) -> usize {
        self.state.lock().incoming.len()
    }

    /// Number of read attempts made by the host, including empty ones.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Simulate unplugging (or replugging) the device.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().disconnected = disconnected;
    }

    /// Install a closure that answers host writes.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(i64) -> Option<i64> + Send + 'static,
    {
        self.state.lock().responder = Some(Box::new(responder));
    }

    /// Remove the responder.
    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }
}

/// Responder that mimics the robot firmware.
///
/// Answers `1 -> 2`, `3 -> 4`, `5 -> 6`, any position id `-> 8`, `9 -> 10`
/// and `11 -> 2` (the device re-confirms the link after a drop). The opening
/// `0` is not produced; queue it with [`MockChannelHandle::push`].
pub fn microcontroller_responder() -> impl FnMut(i64) -> Option<i64> + Send + 'static {
    |value| {
        let signal = match HostCommand::try_from(value) {
            Ok(HostCommand::HandshakeAck | HostCommand::DropAck) => DeviceSignal::HandshakeConfirm,
            Ok(HostCommand::ObjectPresent) => DeviceSignal::ReadyToGrab,
            Ok(HostCommand::ConfirmGrab) => DeviceSignal::RequestGondola,
            Ok(HostCommand::ProceedDrop) => DeviceSignal::Dropped,
            Err(_) if value >= FIRST_POSITION_ID => DeviceSignal::AtGondola,
            Err(_) => return None,
        };
        Some(signal.code())
    }
}
