use super::handle::ControlHandle;
use super::messages::{Command, ControlMessage};
use crate::bridge::{
    ConnectionState, ConnectionStateMachine, DiscoveryCoordinator, DiscoveryOutcome,
    DiscoveryState,
};
use crate::config::FacelightConfig;
use crate::device::{DeviceInfo, DeviceRegistry, DeviceTransport, DiscoveryOptions};
use crate::error::Result;
use crate::events::{EventBus, FacelightEvent};
use crate::pipeline::{AnalysisService, CapturePipeline, FrameSource, ObjectStorage, PipelineState};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External services the core talks to
#[derive(Clone)]
pub struct Collaborators {
    pub frame_source: Arc<dyn FrameSource>,
    pub storage: Arc<dyn ObjectStorage>,
    pub analysis: Arc<dyn AnalysisService>,
    pub transport: Arc<dyn DeviceTransport>,
}

/// Single owner of discovery, connection and pipeline state.
///
/// Commands and collaborator completions arrive on one queue and are applied
/// strictly in delivery order.
pub struct ControlLoop {
    discovery: DiscoveryCoordinator,
    connection: ConnectionStateMachine,
    pipeline: CapturePipeline,
    registry: DeviceRegistry,
    event_bus: Arc<EventBus>,
    rx: mpsc::UnboundedReceiver<ControlMessage>,
    auto_connect: bool,
}

impl ControlLoop {
    pub fn new(
        config: &FacelightConfig,
        collaborators: Collaborators,
        registry: DeviceRegistry,
        event_bus: Arc<EventBus>,
    ) -> (Self, ControlHandle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let discovery = DiscoveryCoordinator::new(
            Arc::clone(&collaborators.transport),
            registry.clone(),
            Arc::clone(&event_bus),
            tx.clone(),
            DiscoveryOptions {
                methods: config.discovery.methods.clone(),
            },
            config.discovery.max_attempts,
        );

        let connection = ConnectionStateMachine::new(
            collaborators.transport,
            registry.clone(),
            Arc::clone(&event_bus),
            tx.clone(),
            config.connection.clone(),
        );

        let pipeline = CapturePipeline::new(
            collaborators.frame_source,
            collaborators.storage,
            collaborators.analysis,
            Arc::clone(&event_bus),
            tx.clone(),
            config.pipeline.clone(),
        );

        let control_loop = Self {
            discovery,
            connection,
            pipeline,
            registry,
            event_bus,
            rx,
            auto_connect: config.connection.auto_connect,
        };

        (control_loop, ControlHandle::new(tx))
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Ask for camera access and reach for a bridge: the last connected one
    /// if known, otherwise whatever discovery finds
    pub fn bootstrap(&mut self) {
        self.pipeline.request_permission();

        match self.registry.most_recently_connected() {
            Some(record) if self.auto_connect => {
                info!("Reconnecting to last known bridge {}", record.device);
                self.connect(&record.device);
            }
            _ => {
                self.discovery.start_discovery();
            }
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("Control loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Control loop cancelled");
                    break;
                }
                message = self.rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if !self.dispatch(message) {
                        break;
                    }
                }
            }
        }

        self.wind_down();
        info!("Control loop stopped");
        Ok(())
    }

    /// Apply one message; returns false once the loop should stop
    pub fn dispatch(&mut self, message: ControlMessage) -> bool {
        match message {
            ControlMessage::Command(command) => return self.on_command(command),
            ControlMessage::Discovery(message) => {
                if let Some(outcome) = self.discovery.handle_message(message) {
                    self.on_discovery_outcome(outcome);
                }
            }
            ControlMessage::Connection(message) => self.connection.handle_message(message),
            ControlMessage::Pipeline(message) => {
                self.pipeline.handle_message(message, &mut self.connection)
            }
        }
        true
    }

    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::TriggerCapture { source } => {
                self.pipeline.trigger_capture(source);
            }
            Command::Retake => self.pipeline.retake(),
            Command::Share { image } => {
                self.pipeline.share(image);
            }
            Command::SwitchCamera => self.pipeline.switch_camera(),
            Command::StartDiscovery => {
                self.discovery.start_discovery();
            }
            Command::StopDiscovery => self.discovery.stop_discovery(),
            Command::Connect {
                device,
                release_current,
                reply,
            } => {
                if release_current
                    && self
                        .connection
                        .active_device()
                        .is_some_and(|active| active != &device)
                {
                    self.connection.release();
                }
                let result = self.connection.connect(&device);
                if result.is_ok() && self.discovery.state() == DiscoveryState::Searching {
                    self.discovery.stop_discovery();
                }
                if let Err(e) = &result {
                    warn!("Connect request rejected: {}", e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Decline { device } => self.connection.decline(&device),
            Command::Shutdown { reason } => {
                let _ = self.event_bus.publish(FacelightEvent::ShutdownRequested {
                    timestamp: SystemTime::now(),
                    reason,
                });
                return false;
            }
        }
        true
    }

    fn on_discovery_outcome(&mut self, outcome: DiscoveryOutcome) {
        if !self.auto_connect || self.connection.state().is_active() {
            return;
        }

        match outcome {
            DiscoveryOutcome::Found(devices) => {
                if let Some(device) = devices.first() {
                    self.connect(device);
                }
            }
            DiscoveryOutcome::Exhausted { notified: false } => {
                if let Some(record) = self.registry.most_recently_connected() {
                    self.connect(&record.device);
                }
            }
            DiscoveryOutcome::Exhausted { notified: true } => {}
        }
    }

    fn connect(&mut self, device: &DeviceInfo) {
        if let Err(e) = self.connection.connect(device) {
            warn!("Automatic connect to {} failed: {}", device, e);
        }
    }

    fn wind_down(&mut self) {
        self.discovery.stop_discovery();
        self.pipeline.reset();
        self.connection.release();
    }
}
