//! Protocol engine for the vision-guided pick-and-place controller.
//!
//! This crate sequences the serial handshake with the microcontroller, debounces
//! the classifier output into stable tool identifications, and maps
//! identified tools to gondola positions.
//!
//! # Architecture
//!
//! - [`HandshakeMachine`] owns the serial channel and runs one transition per
//!   event. It is driven by a single consumer, the [`Driver`].
//! - [`VisionBridge`] runs the [`IdentificationGate`] on perception output and
//!   produces events on the queue the driver drains.
//! - [`SharedState`] carries the flags, read model, dashboard log and gondola
//!   registry between them; [`StatusPublisher`] is the engine's write side.

pub mod driver;
pub mod event;
pub mod gate;
pub mod registry;
pub mod retry;
pub mod shared;
pub mod state_machine;
pub mod status;
pub mod vision;

pub use driver::{
    ControlReceiver, ControlSender, Driver, EventReceiver, EventSender, control_queue,
    event_queue,
};
pub use event::{Event, EventKind, RawEvent, VisionRequest};
pub use gate::{
    Assessment, CachedClassifier, Classifier, DetectionWindow, IdentificationGate,
    StableIdentification,
};
pub use registry::{GondolaRegistry, RegistryReport};
pub use retry::{Clock, ManualClock, RetryPolicy, SystemClock, retry_read};
pub use shared::{ReadModel, SharedFlags, SharedState};
pub use state_machine::{HandshakeMachine, HandshakeMachineBuilder, ProtocolState, StateTransition};
pub use status::{LogEntry, LogRing, StatusPublisher, StatusSnapshot};
pub use vision::VisionBridge;
