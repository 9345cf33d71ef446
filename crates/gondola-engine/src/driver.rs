//! Polling driver for the handshake machine.
//!
//! Every tick drains the event queue without blocking, then feeds the
//! current state's own trigger so device-paced states keep making progress
//! even when nobody produces events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gondola_hardware::SerialChannel;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info};

use crate::event::{Event, VisionRequest};
use crate::retry::Clock;
use crate::state_machine::{HandshakeMachine, StateTransition};

/// Producer side of the event queue.
pub type EventSender = UnboundedSender<Event>;

/// Consumer side of the event queue, owned by the driver.
pub type EventReceiver = UnboundedReceiver<Event>;

/// Producer side of the vision control queue, handed to the machine.
pub type ControlSender = UnboundedSender<VisionRequest>;

/// Consumer side of the vision control queue, owned by the vision bridge.
pub type ControlReceiver = UnboundedReceiver<VisionRequest>;

/// Create the event queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    unbounded_channel()
}

/// Create the vision control queue.
pub fn control_queue() -> (ControlSender, ControlReceiver) {
    unbounded_channel()
}

/// Single consumer of the event queue.
pub struct Driver<C, K> {
    machine: HandshakeMachine<C, K>,
    events: EventReceiver,
    poll_interval: Duration,
    queue_closed: bool,
}

impl<C: SerialChannel, K: Clock> Driver<C, K> {
    /// Create a driver ticking at the machine's configured poll interval.
    pub fn new(machine: HandshakeMachine<C, K>, events: EventReceiver) -> Self {
        let poll_interval = machine.config().poll_interval();
        Self {
            machine,
            events,
            poll_interval,
            queue_closed: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn machine(&self) -> &HandshakeMachine<C, K> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut HandshakeMachine<C, K> {
        &mut self.machine
    }

    pub fn into_machine(self) -> HandshakeMachine<C, K> {
        self.machine
    }

    /// One tick: queued events in order, then the state's own trigger.
    ///
    /// Returns every transition taken during the tick.
    pub fn run_once(&mut self) -> Vec<StateTransition> {
        let mut transitions = Vec::new();

        while !self.queue_closed {
            match self.events.try_recv() {
                Ok(event) => {
                    debug!(kind = %event.kind, "Dequeued event");
                    transitions.extend(self.machine.handle_event(&event));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Event queue closed, continuing with polling only");
                    self.queue_closed = true;
                }
            }
        }

        transitions.extend(self.machine.poll());
        transitions
    }

    /// Tick until `stop` is set, sleeping on the machine's clock in between.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            state = %self.machine.state(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Protocol driver started"
        );
        while !stop.load(Ordering::Relaxed) {
            self.run_once();
            self.machine.clock().sleep(self.poll_interval);
        }
        info!(state = %self.machine.state(), "Protocol driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::retry::ManualClock;
    use crate::state_machine::ProtocolState;
    use gondola_hardware::MockChannel;
    use std::sync::Arc;

    fn driver_in(
        state: ProtocolState,
    ) -> (
        Driver<MockChannel, Arc<ManualClock>>,
        EventSender,
        gondola_hardware::MockChannelHandle,
    ) {
        let (channel, device) = MockChannel::new();
        let machine = HandshakeMachine::builder(channel)
            .with_clock(Arc::new(ManualClock::new()))
            .with_initial_state(state)
            .build();
        let (events, receiver) = event_queue();
        (Driver::new(machine, receiver), events, device)
    }

    #[test]
    fn test_run_once_polls_current_state() {
        let (mut driver, _events, _device) = driver_in(ProtocolState::Init);

        let transitions = driver.run_once();

        assert_eq!(transitions.len(), 1);
        assert_eq!(driver.machine().state(), ProtocolState::WebUiReady);
    }

    #[test]
    fn test_queued_events_precede_poll() {
        let (mut driver, events, device) = driver_in(ProtocolState::Idle);
        events
            .send(Event::new(EventKind::ToolIdentified).with_label("saw"))
            .unwrap();

        let transitions = driver.run_once();

        // The identification moves to ObjectDetected; the poll then finds no 4
        assert_eq!(transitions.len(), 1);
        assert_eq!(driver.machine().state(), ProtocolState::ObjectDetected);
        assert_eq!(device.written(), vec![3]);
    }

    #[test]
    fn test_closed_queue_keeps_polling() {
        let (mut driver, events, _device) = driver_in(ProtocolState::Init);
        drop(events);

        driver.run_once();
        driver.run_once();
        assert_eq!(driver.machine().state(), ProtocolState::WebUiReady);
    }

    #[test]
    fn test_run_stops_on_flag() {
        let (mut driver, _events, _device) = driver_in(ProtocolState::Init);
        let stop = AtomicBool::new(true);

        driver.run(&stop);
        assert_eq!(driver.machine().state(), ProtocolState::Init);
    }
}
