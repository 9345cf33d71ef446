//! Task wiring for the controller process.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context;
use gondola_core::ControllerConfig;
use gondola_engine::{
    Driver, GondolaRegistry, HandshakeMachine, SharedState, StatusPublisher, StatusSnapshot,
    VisionBridge, control_queue, event_queue,
};
use gondola_hardware::{AnyChannel, MockChannel, SerialPortChannel, microcontroller_responder};
use gondola_network::{ServerContext, StatusServer, StatusServerConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Open the serial link, or an emulated microcontroller when `mock_device` is set.
fn open_channel(config: &ControllerConfig, mock_device: bool) -> AnyChannel {
    if mock_device {
        let (channel, handle) = MockChannel::with_name("emulated-mcu");
        handle.set_responder(microcontroller_responder());
        handle.push(gondola_core::constants::DEVICE_HANDSHAKE);
        info!("Using emulated microcontroller");
        return channel.into();
    }
    SerialPortChannel::open_or_detached(&config.serial).into()
}

/// Run the controller until `shutdown` resolves and return the final status.
///
/// The protocol driver runs on a blocking thread since serial reads block.
/// The vision bridge consumes frames pushed through the status endpoint.
pub async fn run<S>(
    config: ControllerConfig,
    mock_device: bool,
    shutdown: S,
) -> anyhow::Result<StatusSnapshot>
where
    S: Future<Output = ()>,
{
    let registry = GondolaRegistry::new(config.gondolas.clone());
    let duplicates = registry.duplicate_positions();
    if !duplicates.is_empty() {
        warn!(?duplicates, "Gondola registry maps several labels to one position");
    }
    let shared = SharedState::new(registry, config.status.log_capacity);
    let status = StatusPublisher::new(shared.clone());

    let (event_tx, event_rx) = event_queue();
    let (control_tx, control_rx) = control_queue();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();

    let server_config = StatusServerConfig {
        bind_addr: config.status.bind_addr.clone(),
        ..StatusServerConfig::default()
    };
    let context = ServerContext::new(status.clone(), event_tx.clone()).with_frames(frame_tx);
    let server = StatusServer::bind(server_config, context)
        .await
        .context("failed to start status endpoint")?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            warn!("Status endpoint stopped: {}", e);
        }
    });

    let machine = HandshakeMachine::builder(open_channel(&config, mock_device))
        .with_config(config.engine.clone())
        .with_shared(shared.clone())
        .with_control(control_tx)
        .build();
    let mut driver = Driver::new(machine, event_rx).with_poll_interval(config.engine.poll_interval());

    let stop = Arc::new(AtomicBool::new(false));
    let driver_stop = Arc::clone(&stop);
    let driver_task = tokio::task::spawn_blocking(move || driver.run(&driver_stop));

    let mut vision = VisionBridge::new(config.gate.clone(), shared.clone(), event_tx)
        .with_control(control_rx);
    let request_interval = config.engine.poll_interval();
    let vision_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(request_interval);
        let mut camera_announced = false;
        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if !camera_announced {
                        vision.announce_camera(true);
                        camera_announced = true;
                    }
                    vision.step(&frame, Instant::now());
                }
                _ = ticker.tick() => {
                    vision.handle_requests(Instant::now());
                }
            }
        }
    });

    shutdown.await;
    info!("Shutting down");

    stop.store(true, Ordering::Relaxed);
    server_task.abort();
    vision_task.abort();
    driver_task.await.context("protocol driver panicked")?;

    Ok(status.snapshot())
}
