//! Shared harness for engine integration tests.
//!
//! [`Harness`] wires a handshake machine, its driver and a vision bridge to one
//! [`SharedState`], with a mock device and a manual clock, the same way the
//! controller binary wires the real components.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gondola_core::config::{EngineConfig, GateConfig};
use gondola_core::{CroppedRegion, Detection, FrameObservation};
use gondola_engine::{
    Clock, Driver, Event, EventSender, HandshakeMachine, ManualClock, ProtocolState, SharedState,
    StateTransition, VisionBridge, control_queue, event_queue,
};
use gondola_hardware::{MockChannel, MockChannelHandle, microcontroller_responder};

pub type TestDriver = Driver<MockChannel, Arc<ManualClock>>;

pub struct Harness {
    pub driver: TestDriver,
    pub vision: VisionBridge,
    pub device: MockChannelHandle,
    pub clock: Arc<ManualClock>,
    pub shared: SharedState,
    pub events: EventSender,
}

impl Harness {
    /// Machine in `Init` with a silent device.
    pub fn new() -> Self {
        Self::in_state(ProtocolState::Init)
    }

    pub fn in_state(state: ProtocolState) -> Self {
        let (channel, device) = MockChannel::new();
        let clock = Arc::new(ManualClock::new());
        let shared = SharedState::default();
        let (events, event_rx) = event_queue();
        let (control_tx, control_rx) = control_queue();

        let machine = HandshakeMachine::builder(channel)
            .with_config(EngineConfig::default())
            .with_shared(shared.clone())
            .with_control(control_tx)
            .with_clock(Arc::clone(&clock))
            .with_initial_state(state)
            .build();
        let vision = VisionBridge::new(GateConfig::default(), shared.clone(), events.clone())
            .with_control(control_rx);

        Self {
            driver: Driver::new(machine, event_rx),
            vision,
            device,
            clock,
            shared,
            events,
        }
    }

    /// Answer host writes the way the firmware does.
    pub fn with_firmware(self) -> Self {
        self.device.set_responder(microcontroller_responder());
        self
    }

    pub fn state(&self) -> ProtocolState {
        self.driver.machine().state()
    }

    pub fn send(&self, event: impl Into<Event>) {
        self.events.send(event.into()).expect("event queue open");
    }

    /// Feed one event straight to the machine, bypassing the queue.
    pub fn handle(&mut self, event: impl Into<Event>) -> Option<StateTransition> {
        self.driver.machine_mut().handle_event(&event.into())
    }

    pub fn tick(&mut self) -> Vec<StateTransition> {
        self.driver.run_once()
    }

    /// Tick until `state` is reached. Panics after `max_ticks`.
    pub fn run_until(&mut self, state: ProtocolState, max_ticks: usize) -> usize {
        for ticks in 0..max_ticks {
            if self.state() == state {
                return ticks;
            }
            self.tick();
        }
        assert_eq!(self.state(), state, "not reached within {max_ticks} ticks");
        max_ticks
    }

    /// Show `label` crossing the line twice, far enough apart to corroborate.
    pub fn identify(&mut self, label: &str, confidence: f64) {
        let now = self.clock.now();
        self.vision.step(&crossing(label, confidence), now);
        self.vision
            .step(&crossing(label, confidence), now + Duration::from_millis(300));
    }
}

/// Frame in which a single object crossed the trigger line.
pub fn crossing(label: &str, confidence: f64) -> FrameObservation {
    let detection = Detection::new(label, confidence).with_bbox([0, 0, 20, 20]);
    FrameObservation {
        crossed: true,
        detected_any: true,
        crop: Some(CroppedRegion::new([40, 40, 20, 20]).with_detections(vec![detection.clone()])),
        detections: vec![detection],
    }
}
