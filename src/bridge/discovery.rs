use crate::control::{ControlMessage, ControlSender};
use crate::device::{DeviceInfo, DeviceRegistry, DeviceTransport, DiscoveryOptions};
use crate::error::{FacelightError, Result};
use crate::events::{EventBus, FacelightEvent};
use crate::generation::{Generation, GenerationCounter};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Searching,
    Found { attempt: u32 },
    Exhausted { attempts: u32 },
}

/// One discovery run including its retries
#[derive(Debug, Clone)]
pub struct DiscoverySession {
    pub attempt: u32,
    pub found_devices: Vec<DeviceInfo>,
    pub in_progress: bool,
}

#[derive(Debug)]
pub enum DiscoveryMessage {
    ProbeCompleted {
        generation: Generation,
        attempt: u32,
        result: Result<Vec<DeviceInfo>>,
    },
}

/// How a discovery run ended
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryOutcome {
    Found(Vec<DeviceInfo>),
    /// `notified` is true when the bridge-not-found event was raised
    Exhausted { notified: bool },
}

/// Bounded-retry bridge discovery.
///
/// Probes are re-issued immediately while they come back empty, up to
/// `max_attempts` retries. Transport failures count as empty probes.
pub struct DiscoveryCoordinator {
    transport: Arc<dyn DeviceTransport>,
    registry: DeviceRegistry,
    event_bus: Arc<EventBus>,
    tx: ControlSender,
    options: DiscoveryOptions,
    max_attempts: u32,
    state: DiscoveryState,
    session: Option<DiscoverySession>,
    generations: GenerationCounter,
}

impl DiscoveryCoordinator {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        registry: DeviceRegistry,
        event_bus: Arc<EventBus>,
        tx: ControlSender,
        options: DiscoveryOptions,
        max_attempts: u32,
    ) -> Self {
        Self {
            transport,
            registry,
            event_bus,
            tx,
            options,
            max_attempts,
            state: DiscoveryState::Idle,
            session: None,
            generations: GenerationCounter::new(),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn session(&self) -> Option<&DiscoverySession> {
        self.session.as_ref()
    }

    /// Begin a discovery run; does nothing while one is in progress
    pub fn start_discovery(&mut self) -> bool {
        if self.state == DiscoveryState::Searching {
            debug!("Discovery already running, ignoring start request");
            return false;
        }

        let generation = self.generations.advance();
        self.state = DiscoveryState::Searching;
        self.session = Some(DiscoverySession {
            attempt: 0,
            found_devices: Vec::new(),
            in_progress: true,
        });

        info!("Starting bridge discovery ({})", generation);
        let _ = self.event_bus.publish(FacelightEvent::DiscoveryStarted);
        self.issue_probe(generation, 0);
        true
    }

    /// Abort the current run; late probe results are discarded
    pub fn stop_discovery(&mut self) {
        self.generations.advance();
        if self.state == DiscoveryState::Searching {
            info!("Bridge discovery stopped");
        }
        self.state = DiscoveryState::Idle;
        self.session = None;
    }

    pub fn handle_message(&mut self, message: DiscoveryMessage) -> Option<DiscoveryOutcome> {
        match message {
            DiscoveryMessage::ProbeCompleted {
                generation,
                attempt,
                result,
            } => self.on_probe_completed(generation, attempt, result),
        }
    }

    fn on_probe_completed(
        &mut self,
        generation: Generation,
        attempt: u32,
        result: Result<Vec<DeviceInfo>>,
    ) -> Option<DiscoveryOutcome> {
        if !self.generations.is_current(generation) || self.state != DiscoveryState::Searching {
            debug!(
                "Discarding stale discovery probe result ({}, attempt {})",
                generation, attempt
            );
            return None;
        }

        let devices = match result {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Discovery probe {} failed: {}", attempt, e);
                Vec::new()
            }
        };

        if !devices.is_empty() {
            info!(
                "Discovery found {} bridge(s) on attempt {}",
                devices.len(),
                attempt
            );
            self.registry.record_discovered(&devices);
            self.state = DiscoveryState::Found { attempt };
            self.session = None;
            let _ = self.event_bus.publish(FacelightEvent::DevicesDiscovered {
                devices: devices.clone(),
                attempt,
            });
            return Some(DiscoveryOutcome::Found(devices));
        }

        if attempt < self.max_attempts {
            let next = attempt + 1;
            if let Some(session) = self.session.as_mut() {
                session.attempt = next;
            }
            debug!("No bridge found, retrying (attempt {}/{})", next, self.max_attempts);
            self.issue_probe(generation, next);
            return None;
        }

        let exhausted = FacelightError::DiscoveryExhausted { attempts: attempt };
        self.state = DiscoveryState::Exhausted { attempts: attempt };
        self.session = None;

        let notified = !self.registry.has_connected_before();
        if notified {
            warn!("{}", exhausted);
            let _ = self
                .event_bus
                .publish(FacelightEvent::BridgeNotFound { attempts: attempt });
        } else {
            info!("{}, falling back to the last connected bridge", exhausted);
        }

        Some(DiscoveryOutcome::Exhausted { notified })
    }

    fn issue_probe(&self, generation: Generation, attempt: u32) {
        let transport = Arc::clone(&self.transport);
        let options = self.options.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = transport.discover(&options).await;
            let message: ControlMessage = DiscoveryMessage::ProbeCompleted {
                generation,
                attempt,
                result,
            }
            .into();
            if tx.send(message).is_err() {
                debug!("Control loop gone, dropping discovery probe result");
            }
        });
    }
}
