//! Serial handshake state machine.
//!
//! This module sequences the pick-and-place cycle against the microcontroller.
//! The machine owns no thread and no event loop: an external driver calls
//! [`HandshakeMachine::handle_event`] repeatedly, and each call performs at
//! most one transition.
//!
//! # States
//!
//! - `Init` → `WebUiReady` → `Bootstrapped` → `SerialHandshake` → `SerialAck`
//!   → `Idle` (bring-up and the `0 → 1 → 2` handshake)
//! - `Idle` → `ObjectDetected` → (`AwaitToolIdent` →) `ObjectDefined` →
//!   `GondolaSet` → `DropObject` → `SerialAck` (one pick cycle)
//!
//! # Guards and Failure Handling
//!
//! Guards that depend on the device read the link with a bounded retry
//! (`engine.read_attempts` tries, `engine.read_delay_ms` apart). An empty read
//! means "not yet", never an error. When a guard is satisfied but the paired
//! write fails, the machine keeps its state and latches the value it read, so
//! the next call retries the same transition.
//!
//! Any event that is not in the current state's row of the table is a no-op.
//!
//! # Examples
//!
//! ```
//! use gondola_engine::{Event, EventKind, HandshakeMachine, ProtocolState, SharedState};
//! use gondola_hardware::MockChannel;
//!
//! let (channel, device) = MockChannel::new();
//! let mut machine = HandshakeMachine::builder(channel)
//!     .with_initial_state(ProtocolState::SerialHandshake)
//!     .build();
//!
//! device.push(0);
//! machine.handle_event(&Event::new(EventKind::SerialOn));
//!
//! assert_eq!(machine.state(), ProtocolState::SerialAck);
//! assert_eq!(device.written(), vec![1]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use gondola_core::config::EngineConfig;
use gondola_hardware::SerialChannel;
use gondola_protocol::{DeviceSignal, HostCommand};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, trace, warn};

use crate::event::{Event, EventKind, VisionRequest};
use crate::retry::{Clock, RetryPolicy, SystemClock, retry_read};
use crate::shared::SharedState;
use crate::status::StatusPublisher;

/// Maximum number of state transitions to keep in history.
const MAX_HISTORY_SIZE: usize = 100;

/// Every state of the pick-and-place protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    /// Process started.
    Init,

    /// Waiting for the dashboard (or the camera) to report ready.
    WebUiReady,

    /// Reserved. No transition enters it; it behaves like `Bootstrapped`.
    CameraReady,

    /// Peripherals are up; the serial handshake can start.
    Bootstrapped,

    /// Waiting for the device's `0`.
    SerialHandshake,

    /// Waiting for the device's `2`.
    SerialAck,

    /// Link established, waiting for an object.
    Idle,

    /// `3` sent, waiting for the device's `4`.
    ObjectDetected,

    /// Device is ready to grab but vision has not identified the tool yet.
    AwaitToolIdent,

    /// `5` sent, waiting for the device's `6`.
    ObjectDefined,

    /// Position id sent, waiting for the device's `8`.
    GondolaSet,

    /// `9` sent, waiting for the device's `10`.
    DropObject,
}

impl ProtocolState {
    /// Every state, in cycle order.
    pub const ALL: [ProtocolState; 12] = [
        Self::Init,
        Self::WebUiReady,
        Self::CameraReady,
        Self::Bootstrapped,
        Self::SerialHandshake,
        Self::SerialAck,
        Self::Idle,
        Self::ObjectDetected,
        Self::AwaitToolIdent,
        Self::ObjectDefined,
        Self::GondolaSet,
        Self::DropObject,
    ];

    /// Trigger a polling driver feeds while sitting in this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use gondola_engine::{EventKind, ProtocolState};
    ///
    /// assert_eq!(ProtocolState::SerialHandshake.poll_trigger(), EventKind::SerialOn);
    /// assert_eq!(ProtocolState::DropObject.poll_trigger(), EventKind::DropObject);
    /// ```
    pub fn poll_trigger(self) -> EventKind {
        match self {
            Self::Init => EventKind::Inicial,
            Self::WebUiReady => EventKind::WebserverOn,
            Self::CameraReady | Self::Bootstrapped => EventKind::WebDone,
            Self::SerialHandshake => EventKind::SerialOn,
            Self::SerialAck => EventKind::SerialOnAck,
            Self::Idle => EventKind::Idle,
            Self::ObjectDetected => EventKind::ObjDetected,
            Self::AwaitToolIdent => EventKind::AwaitToolIdent,
            Self::ObjectDefined => EventKind::ObjDefined,
            Self::GondolaSet => EventKind::GondolaSet,
            Self::DropObject => EventKind::DropObject,
        }
    }

    /// Whether `kind` appears in this state's row of the transition table.
    pub fn handles(self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (Self::Init, EventKind::Inicial)
                | (Self::WebUiReady, EventKind::WebserverOn | EventKind::CamOnline)
                | (Self::CameraReady | Self::Bootstrapped, EventKind::WebDone)
                | (Self::SerialHandshake, EventKind::SerialOn)
                | (Self::SerialAck, EventKind::SerialOnAck)
                | (Self::Idle, EventKind::Idle | EventKind::ToolIdentified)
                | (Self::ObjectDetected, EventKind::ObjDetected)
                | (Self::AwaitToolIdent, EventKind::AwaitToolIdent)
                | (Self::ObjectDefined, EventKind::ObjDefined)
                | (Self::GondolaSet, EventKind::GondolaSet)
                | (Self::DropObject, EventKind::DropObject)
        )
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            Self::Init => "Init",
            Self::WebUiReady => "WebUiReady",
            Self::CameraReady => "CameraReady",
            Self::Bootstrapped => "Bootstrapped",
            Self::SerialHandshake => "SerialHandshake",
            Self::SerialAck => "SerialAck",
            Self::Idle => "Idle",
            Self::ObjectDetected => "ObjectDetected",
            Self::AwaitToolIdent => "AwaitToolIdent",
            Self::ObjectDefined => "ObjectDefined",
            Self::GondolaSet => "GondolaSet",
            Self::DropObject => "DropObject",
        };
        write!(f, "{}", state_str)
    }
}

/// A single state transition with the instant it happened.
///
/// The `at` field is not serialized as `Instant` is process-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ProtocolState,
    pub to: ProtocolState,

    #[serde(skip, default = "Instant::now")]
    pub at: Instant,
}

impl StateTransition {
    pub fn new(from: ProtocolState, to: ProtocolState, at: Instant) -> Self {
        Self { from, to, at }
    }
}

impl PartialEq for StateTransition {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

/// The protocol engine.
///
/// Owns the serial channel and its own timers. Everything other workers need
/// to see goes through the [`SharedState`] handle it was built with.
pub struct HandshakeMachine<C, K = SystemClock> {
    channel: C,
    clock: K,
    config: EngineConfig,
    status: StatusPublisher,
    control: Option<UnboundedSender<VisionRequest>>,

    state: ProtocolState,
    state_entered_at: Instant,
    await_tool_since: Option<Instant>,
    await_tool_retries: u32,

    /// Device value that satisfied a guard whose write then failed.
    latched: Option<i64>,

    history: VecDeque<StateTransition>,
}

impl<C: SerialChannel> HandshakeMachine<C, SystemClock> {
    /// Create a machine in `Init` with default engine settings.
    pub fn new(channel: C, shared: SharedState) -> Self {
        Self::builder(channel).with_shared(shared).build()
    }

    /// Create a builder for a machine over `channel`.
    pub fn builder(channel: C) -> HandshakeMachineBuilder<C, SystemClock> {
        HandshakeMachineBuilder::new(channel)
    }
}

impl<C: SerialChannel, K: Clock> HandshakeMachine<C, K> {
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn state_entered_at(&self) -> Instant {
        self.state_entered_at
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.state_entered_at)
    }

    /// Start of the current identification wait, if waiting.
    pub fn await_tool_since(&self) -> Option<Instant> {
        self.await_tool_since
    }

    /// Re-identification requests issued in the current wait.
    pub fn retry_count(&self) -> u32 {
        self.await_tool_retries
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared(&self) -> &SharedState {
        self.status.shared()
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Feed the trigger of the current state, as a polling driver does.
    pub fn poll(&mut self) -> Option<StateTransition> {
        let trigger = Event::new(self.state.poll_trigger());
        self.handle_event(&trigger)
    }

    /// Process one event. Returns the transition taken, if any.
    pub fn handle_event(&mut self, event: &Event) -> Option<StateTransition> {
        use EventKind as E;
        use ProtocolState as S;

        match (self.state, event.kind) {
            (S::Init, E::Inicial) => {
                self.status.log("System initialized");
                Some(self.transition_to(S::WebUiReady))
            }
            (S::WebUiReady, E::WebserverOn) => {
                if !self.shared().webserver_ready() {
                    trace!("Webserver not ready yet");
                    return None;
                }
                Some(self.transition_to(S::Bootstrapped))
            }
            (S::WebUiReady, E::CamOnline) => {
                if !self.shared().camera_ready() {
                    trace!("Camera not ready yet");
                    return None;
                }
                Some(self.transition_to(S::Bootstrapped))
            }
            (S::CameraReady | S::Bootstrapped, E::WebDone) => {
                Some(self.transition_to(S::SerialHandshake))
            }
            (S::SerialHandshake, E::SerialOn) => {
                self.exchange(DeviceSignal::Handshake, S::SerialAck)
            }
            (S::SerialAck, E::SerialOnAck) => {
                self.exchange(DeviceSignal::HandshakeConfirm, S::Idle)
            }
            (S::Idle, E::Idle) => self.on_idle_poll(),
            (S::Idle, E::ToolIdentified) => self.on_tool_identified(event),
            (S::ObjectDetected, E::ObjDetected) => self.on_ready_to_grab(),
            (S::AwaitToolIdent, E::AwaitToolIdent) => self.on_await_tool(),
            (S::ObjectDefined, E::ObjDefined) => self.on_gondola_request(),
            (S::GondolaSet, E::GondolaSet) => {
                self.exchange(DeviceSignal::AtGondola, S::DropObject)
            }
            (S::DropObject, E::DropObject) => self.on_dropped(),
            (state, kind) => {
                trace!(%state, %kind, "Event ignored");
                None
            }
        }
    }

    fn on_idle_poll(&mut self) -> Option<StateTransition> {
        if !self.shared().object_detected() {
            return None;
        }
        if !self.send(HostCommand::ObjectPresent) {
            return None;
        }
        Some(self.transition_to(ProtocolState::ObjectDetected))
    }

    fn on_tool_identified(&mut self, event: &Event) -> Option<StateTransition> {
        let Some(label) = event.label() else {
            trace!("Identification event without label");
            return None;
        };
        self.shared().record_identification(label);
        self.await_tool_retries = 0;
        self.status.log(format!("Tool identified: {label}"));

        if !self.send(HostCommand::ObjectPresent) {
            return None;
        }
        Some(self.transition_to(ProtocolState::ObjectDetected))
    }

    fn on_ready_to_grab(&mut self) -> Option<StateTransition> {
        let value = self.expect_signal(DeviceSignal::ReadyToGrab)?;

        if self.shared().identified_label().is_some() {
            if !self.write_or_latch(HostCommand::ConfirmGrab.code(), value) {
                return None;
            }
            self.await_tool_retries = 0;
            return Some(self.transition_to(ProtocolState::ObjectDefined));
        }

        self.await_tool_since = Some(self.clock.now());
        self.await_tool_retries = 0;
        self.status.log("Waiting for tool identification");
        Some(self.transition_to(ProtocolState::AwaitToolIdent))
    }

    fn on_await_tool(&mut self) -> Option<StateTransition> {
        if self.shared().identified_label().is_some() {
            if !self.send(HostCommand::ConfirmGrab) {
                return None;
            }
            self.await_tool_retries = 0;
            return Some(self.transition_to(ProtocolState::ObjectDefined));
        }

        let now = self.clock.now();
        let since = self.await_tool_since.unwrap_or(self.state_entered_at);
        if now.saturating_duration_since(since) <= self.config.await_tool_timeout() {
            return None;
        }

        if self.await_tool_retries < self.config.await_tool_max_retries {
            self.await_tool_retries += 1;
            self.await_tool_since = Some(now);
            self.request_reidentification();
            return None;
        }

        self.status
            .log("Tool identification retries exhausted, returning to Idle");
        self.shared().clear_detection();
        self.await_tool_retries = 0;
        Some(self.transition_to(ProtocolState::Idle))
    }

    fn on_gondola_request(&mut self) -> Option<StateTransition> {
        let value = self.expect_signal(DeviceSignal::RequestGondola)?;

        let label = self.shared().detected_label().unwrap_or_default();
        let position = self
            .shared()
            .resolve_position(&label, self.config.default_position_id);
        if !self.write_or_latch(position, value) {
            return None;
        }

        self.status
            .log(format!("Label {:?} assigned to gondola {}", label.trim(), position));
        self.status.publish_gondola(Some(position));
        Some(self.transition_to(ProtocolState::GondolaSet))
    }

    fn on_dropped(&mut self) -> Option<StateTransition> {
        let transition = self.exchange(DeviceSignal::Dropped, ProtocolState::SerialAck)?;
        self.shared().clear_detection();
        self.status.publish_gondola(None);
        Some(transition)
    }

    /// Read `expected`, answer with its fixed reply if it has one, then move
    /// to `next`.
    fn exchange(&mut self, expected: DeviceSignal, next: ProtocolState) -> Option<StateTransition> {
        let value = self.expect_signal(expected)?;
        if let Some(reply) = expected.expected_reply()
            && !self.write_or_latch(reply.code(), value)
        {
            return None;
        }
        Some(self.transition_to(next))
    }

    /// Guard read that only passes when the device sent `expected`.
    fn expect_signal(&mut self, expected: DeviceSignal) -> Option<i64> {
        let value = self.read_guard()?;
        if value == expected.code() {
            return Some(value);
        }
        match DeviceSignal::try_from(value) {
            Ok(signal) => {
                debug!(state = %self.state, %signal, %expected, "Out-of-order device signal")
            }
            Err(_) => debug!(state = %self.state, value, %expected, "Unknown device value"),
        }
        None
    }

    /// Latched value first, otherwise a bounded read of the link.
    fn read_guard(&mut self) -> Option<i64> {
        if let Some(value) = self.latched.take() {
            return Some(value);
        }
        let policy = RetryPolicy::new(self.config.read_attempts, self.config.read_delay());
        let channel = &mut self.channel;
        retry_read(&self.clock, policy, || channel.try_read_int())
    }

    fn write(&mut self, value: i64) -> bool {
        if self.channel.write_int(value) {
            return true;
        }
        warn!(state = %self.state, value, "Serial write failed, retrying on next poll");
        self.shared()
            .append_log(format!("Serial write of {value} failed in {}", self.state));
        false
    }

    fn send(&mut self, command: HostCommand) -> bool {
        self.write(command.code())
    }

    fn write_or_latch(&mut self, value: i64, read: i64) -> bool {
        if self.write(value) {
            return true;
        }
        self.latched = Some(read);
        false
    }

    fn request_reidentification(&mut self) {
        let attempt = self.await_tool_retries;
        let max = self.config.await_tool_max_retries;
        match &self.control {
            Some(control) => {
                if control.send(VisionRequest::RequestIdentification).is_err() {
                    warn!("Vision control queue closed, re-identification request dropped");
                }
            }
            None => debug!("No vision control queue attached"),
        }
        self.status.log(format!(
            "Identification timeout, requesting re-identification ({attempt}/{max})"
        ));
    }

    fn transition_to(&mut self, next: ProtocolState) -> StateTransition {
        let now = self.clock.now();
        let from = self.state;
        let transition = StateTransition::new(from, next, now);

        info!(%from, to = %next, "State transition");
        if from == ProtocolState::AwaitToolIdent && next != ProtocolState::AwaitToolIdent {
            self.await_tool_since = None;
        }
        self.state = next;
        self.state_entered_at = now;
        self.latched = None;

        self.status.publish_state(next);
        self.shared().append_log(format!("{from} -> {next}"));

        self.history.push_back(transition.clone());
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        transition
    }
}

impl<C, K> fmt::Debug for HandshakeMachine<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeMachine")
            .field("state", &self.state)
            .field("await_tool_retries", &self.await_tool_retries)
            .field("latched", &self.latched)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`HandshakeMachine`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use gondola_core::config::EngineConfig;
/// use gondola_engine::{HandshakeMachine, ManualClock, ProtocolState, SharedState};
/// use gondola_hardware::MockChannel;
///
/// let (channel, _device) = MockChannel::new();
/// let (control, _requests) = tokio::sync::mpsc::unbounded_channel();
///
/// let machine = HandshakeMachine::builder(channel)
///     .with_config(EngineConfig::default())
///     .with_shared(SharedState::default())
///     .with_control(control)
///     .with_clock(Arc::new(ManualClock::new()))
///     .with_initial_state(ProtocolState::Idle)
///     .build();
///
/// assert_eq!(machine.state(), ProtocolState::Idle);
/// assert_eq!(machine.shared().state(), ProtocolState::Idle);
/// ```
pub struct HandshakeMachineBuilder<C, K = SystemClock> {
    channel: C,
    clock: K,
    config: EngineConfig,
    shared: Option<SharedState>,
    control: Option<UnboundedSender<VisionRequest>>,
    initial_state: ProtocolState,
}

impl<C: SerialChannel> HandshakeMachineBuilder<C, SystemClock> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            clock: SystemClock,
            config: EngineConfig::default(),
            shared: None,
            control: None,
            initial_state: ProtocolState::Init,
        }
    }
}

impl<C: SerialChannel, K: Clock> HandshakeMachineBuilder<C, K> {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_shared(mut self, shared: SharedState) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Queue on which re-identification requests are sent to vision.
    pub fn with_control(mut self, control: UnboundedSender<VisionRequest>) -> Self {
        self.control = Some(control);
        self
    }

    /// Start in a state other than `Init`.
    pub fn with_initial_state(mut self, state: ProtocolState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn with_clock<K2: Clock>(self, clock: K2) -> HandshakeMachineBuilder<C, K2> {
        HandshakeMachineBuilder {
            channel: self.channel,
            clock,
            config: self.config,
            shared: self.shared,
            control: self.control,
            initial_state: self.initial_state,
        }
    }

    pub fn build(self) -> HandshakeMachine<C, K> {
        let status = StatusPublisher::new(self.shared.unwrap_or_default());
        status.publish_state(self.initial_state);
        let now = self.clock.now();
        let await_tool_since = (self.initial_state == ProtocolState::AwaitToolIdent).then_some(now);

        HandshakeMachine {
            channel: self.channel,
            clock: self.clock,
            config: self.config,
            status,
            control: self.control,
            state: self.initial_state,
            state_entered_at: now,
            await_tool_since,
            await_tool_retries: 0,
            latched: None,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }
}
