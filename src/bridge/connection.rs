use crate::color::{color_for_emotion, default_pattern_color, DeviceColor};
use crate::config::ConnectionConfig;
use crate::control::{ControlMessage, ControlSender};
use crate::device::{
    CommandReport, DeviceInfo, DeviceRegistry, DeviceTransport, HandshakeEvent, LightCommand,
};
use crate::error::{FacelightError, Result};
use crate::events::{EventBus, FacelightEvent};
use crate::generation::{Generation, GenerationCounter};
use crate::pipeline::{Emotion, LightReactor};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
    Unauthenticated,
    Connected,
}

impl ConnectionState {
    /// States in which the bridge counts as the active one
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Authenticated
                | ConnectionState::Unauthenticated
                | ConnectionState::Connected
        )
    }
}

#[derive(Debug)]
pub enum ConnectionMessage {
    Handshake {
        generation: Generation,
        event: HandshakeEvent,
    },
    HandshakeFailed {
        generation: Generation,
        error: FacelightError,
    },
    HandshakeClosed {
        generation: Generation,
    },
    DisconnectDue {
        generation: Generation,
        device: DeviceInfo,
    },
    PairingTick {
        generation: Generation,
        remaining: u64,
    },
    CommandsApplied {
        device: DeviceInfo,
        report: CommandReport,
    },
}

/// What to send to each fixture in a fan-out
#[derive(Debug, Clone, Copy)]
enum LightPlan {
    Uniform(DeviceColor),
    DefaultPattern,
}

impl LightPlan {
    fn color_for(&self, index: usize) -> DeviceColor {
        match self {
            LightPlan::Uniform(color) => *color,
            LightPlan::DefaultPattern => default_pattern_color(index),
        }
    }
}

/// Lifecycle of the connection to a single bridge.
///
/// Every handshake is tagged with the generation current when `connect` was
/// called; events from an older generation are dropped.
pub struct ConnectionStateMachine {
    transport: Arc<dyn DeviceTransport>,
    registry: DeviceRegistry,
    event_bus: Arc<EventBus>,
    tx: ControlSender,
    config: ConnectionConfig,
    state: ConnectionState,
    active: Option<DeviceInfo>,
    generations: GenerationCounter,
    pairing: Option<CancellationToken>,
    pending_disconnect: Option<CancellationToken>,
}

impl ConnectionStateMachine {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        registry: DeviceRegistry,
        event_bus: Arc<EventBus>,
        tx: ControlSender,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            event_bus,
            tx,
            config,
            state: ConnectionState::Disconnected,
            active: None,
            generations: GenerationCounter::new(),
            pairing: None,
            pending_disconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn active_device(&self) -> Option<&DeviceInfo> {
        self.active.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    /// Start connecting to `device`.
    ///
    /// Connecting to the active bridge again is a no-op, except while it waits
    /// for pairing, where the handshake starts over. A different active bridge
    /// has to be released first, including one that is still pairing.
    pub fn connect(&mut self, device: &DeviceInfo) -> Result<()> {
        if let Some(active) = &self.active {
            if self.state.is_active() {
                if active == device && self.state == ConnectionState::Unauthenticated {
                    info!("Restarting handshake with {} while pairing", device);
                } else if active == device {
                    if let Some(token) = self.pending_disconnect.take() {
                        info!("Reusing connection to {}, disconnect cancelled", device);
                        token.cancel();
                    } else {
                        debug!("Already connecting/connected to {}", device);
                    }
                    return Ok(());
                } else {
                    return Err(FacelightError::ConflictingConnection {
                        active: active.to_string(),
                        requested: device.to_string(),
                    });
                }
            }
        }

        self.cancel_pairing();
        if let Some(token) = self.pending_disconnect.take() {
            token.cancel();
        }
        let generation = self.generations.advance();
        self.active = Some(device.clone());
        self.state = ConnectionState::Connecting;
        info!("Connecting to bridge {} ({})", device, generation);

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let device = device.clone();
        tokio::spawn(async move {
            match transport.connect(&device).await {
                Ok(mut events) => {
                    while let Some(event) = events.recv().await {
                        let message: ControlMessage =
                            ConnectionMessage::Handshake { generation, event }.into();
                        if tx.send(message).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(ConnectionMessage::HandshakeClosed { generation }.into());
                }
                Err(error) => {
                    let _ = tx.send(ConnectionMessage::HandshakeFailed { generation, error }.into());
                }
            }
        });

        Ok(())
    }

    /// Tear the connection down right away
    pub fn release(&mut self) {
        let Some(device) = self.active.take() else {
            return;
        };

        self.generations.advance();
        self.cancel_pairing();
        if let Some(token) = self.pending_disconnect.take() {
            token.cancel();
        }
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        info!("Released bridge {}", device);

        let transport = Arc::clone(&self.transport);
        let closing = device.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.disconnect(&closing).await {
                warn!("Failed to disconnect from {}: {}", closing, e);
            }
        });

        if was_connected {
            let _ = self
                .event_bus
                .publish(FacelightEvent::DeviceDisconnected { device });
        }
    }

    /// Disconnect after the grace period unless the connection is reused
    pub fn disconnect(&mut self) {
        let Some(device) = self.active.clone() else {
            debug!("Disconnect requested without an active bridge");
            return;
        };

        if self.pending_disconnect.is_some() {
            debug!("Disconnect from {} already pending", device);
            return;
        }

        let token = CancellationToken::new();
        self.pending_disconnect = Some(token.clone());

        let generation = self.generations.current();
        let grace = self.config.disconnect_grace();
        let tx = self.tx.clone();
        debug!("Disconnecting from {} in {:?}", device, grace);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(grace) => {
                    let _ = tx.send(ConnectionMessage::DisconnectDue { generation, device }.into());
                }
            }
        });
    }

    /// The user switched `device` off: show the default pattern and forget it
    /// when it was the last connected bridge
    pub fn decline(&mut self, device: &DeviceInfo) {
        self.apply_default_pattern();

        let last = self.registry.most_recently_connected().map(|r| r.device);
        if last.as_ref() == Some(device) {
            self.registry.forget(device.unique_id());
            if self.active.as_ref() == Some(device) {
                self.disconnect();
            }
        }
    }

    pub fn apply_color(&mut self, color: DeviceColor) {
        self.fan_out(LightPlan::Uniform(color));
    }

    pub fn handle_message(&mut self, message: ConnectionMessage) {
        match message {
            ConnectionMessage::Handshake { generation, event } => {
                if !self.generations.is_current(generation) {
                    debug!("Discarding stale handshake event {:?} ({})", event, generation);
                    return;
                }
                self.on_handshake_event(event);
            }
            ConnectionMessage::HandshakeFailed { generation, error } => {
                if !self.generations.is_current(generation) {
                    debug!("Discarding stale handshake failure ({})", generation);
                    return;
                }
                error!("Connection handshake failed: {}", error);
                self.cancel_pairing();
                self.active = None;
                self.state = ConnectionState::Disconnected;
                let _ = self.event_bus.publish(FacelightEvent::SystemError {
                    component: "connection".to_string(),
                    error: error.to_string(),
                });
            }
            ConnectionMessage::HandshakeClosed { generation } => {
                if self.generations.is_current(generation)
                    && self.state == ConnectionState::Connecting
                {
                    warn!("Handshake ended before the bridge authenticated");
                    self.active = None;
                    self.state = ConnectionState::Disconnected;
                }
            }
            ConnectionMessage::DisconnectDue { generation, device } => {
                if !self.generations.is_current(generation) {
                    debug!("Connection to {} was reused, skipping disconnect", device);
                    return;
                }
                if self.active.as_ref() == Some(&device) {
                    self.release();
                }
            }
            ConnectionMessage::PairingTick {
                generation,
                remaining,
            } => self.on_pairing_tick(generation, remaining),
            ConnectionMessage::CommandsApplied { device, report } => {
                for failure in &report.failures {
                    warn!("Light update on {} failed: {}", device, failure);
                }
                debug!(
                    "Light update on {}: {}/{} fixtures updated",
                    device,
                    report.succeeded(),
                    report.attempted
                );
                let _ = self.event_bus.publish(FacelightEvent::LightsUpdated {
                    attempted: report.attempted,
                    failed: report.failures.len(),
                });
            }
        }
    }

    fn on_handshake_event(&mut self, event: HandshakeEvent) {
        let Some(device) = self.active.clone() else {
            return;
        };

        match event {
            HandshakeEvent::Authenticated => {
                self.state = ConnectionState::Authenticated;
                info!("Bridge {} authenticated", device);
                self.cancel_pairing();
                self.state = ConnectionState::Connected;
                self.registry.upsert(&device, Utc::now());
                let _ = self
                    .event_bus
                    .publish(FacelightEvent::DeviceConnected { device });
                self.apply_default_pattern();
            }
            HandshakeEvent::NotAuthenticated => {
                let pairing = FacelightError::PairingRequired {
                    device: device.to_string(),
                };
                info!("{}", pairing);
                self.state = ConnectionState::Unauthenticated;
                let _ = self.event_bus.publish(FacelightEvent::PairingRequired {
                    device: device.clone(),
                });
                let _ = self.event_bus.publish(FacelightEvent::StatusMessage {
                    text: pairing.user_message(),
                });
                self.start_pairing_countdown(device);
            }
            HandshakeEvent::Connected => {
                info!("Bridge {} reports connected", device);
            }
            HandshakeEvent::LinkButtonNotPressed => {
                info!("Link button on {} not pressed yet", device);
            }
        }
    }

    fn start_pairing_countdown(&mut self, device: DeviceInfo) {
        self.cancel_pairing();

        let token = CancellationToken::new();
        self.pairing = Some(token.clone());

        let generation = self.generations.current();
        let total = self.config.pairing_timeout_seconds;
        let tick = self.config.pairing_tick();
        let tx = self.tx.clone();

        let _ = self.event_bus.publish(FacelightEvent::PairingProgress {
            device,
            fraction: 1.0,
        });

        tokio::spawn(async move {
            for remaining in (0..total).rev() {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = sleep(tick) => {
                        let message: ControlMessage =
                            ConnectionMessage::PairingTick { generation, remaining }.into();
                        if tx.send(message).is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    fn on_pairing_tick(&mut self, generation: Generation, remaining: u64) {
        if !self.generations.is_current(generation) || self.state == ConnectionState::Connected {
            return;
        }
        let Some(device) = self.active.clone() else {
            return;
        };

        let total = self.config.pairing_timeout_seconds;
        let _ = self.event_bus.publish(FacelightEvent::PairingProgress {
            device: device.clone(),
            fraction: remaining as f32 / total as f32,
        });

        if remaining == 0 {
            let timeout_error = FacelightError::HandshakeTimeout {
                device: device.to_string(),
                seconds: total,
            };
            warn!("{}", timeout_error);
            self.pairing = None;
            let _ = self
                .event_bus
                .publish(FacelightEvent::PairingTimedOut { device });
        }
    }

    fn cancel_pairing(&mut self) {
        if let Some(token) = self.pairing.take() {
            token.cancel();
        }
    }

    fn fan_out(&self, plan: LightPlan) {
        if self.state != ConnectionState::Connected {
            debug!("Bridge offline ({:?}), dropping light update", self.state);
            return;
        }
        let Some(device) = self.active.clone() else {
            return;
        };

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let command_timeout = self.config.command_timeout();

        tokio::spawn(async move {
            let report = send_to_all_lights(transport, &device, plan, command_timeout).await;
            let _ = tx.send(ConnectionMessage::CommandsApplied { device, report }.into());
        });
    }
}

impl LightReactor for ConnectionStateMachine {
    fn apply_emotion_reaction(&mut self, emotion: Emotion) {
        match color_for_emotion(emotion) {
            Some(color) => self.apply_color(color),
            None => debug!("No colour mapped for {:?}, lights unchanged", emotion),
        }
    }

    fn apply_default_pattern(&mut self) {
        self.fan_out(LightPlan::DefaultPattern);
    }
}

async fn send_to_all_lights(
    transport: Arc<dyn DeviceTransport>,
    device: &DeviceInfo,
    plan: LightPlan,
    command_timeout: Duration,
) -> CommandReport {
    let lights = match transport.lights(device).await {
        Ok(lights) => lights,
        Err(e) => {
            return CommandReport {
                attempted: 0,
                failures: vec![format!("listing lights failed: {}", e)],
            }
        }
    };

    let commands: Vec<LightCommand> = lights
        .into_iter()
        .enumerate()
        .map(|(index, light)| LightCommand {
            light,
            on: true,
            color: plan.color_for(index),
        })
        .collect();

    let outcomes = join_all(commands.iter().map(|command| {
        let transport = Arc::clone(&transport);
        async move {
            match timeout(command_timeout, transport.send_command(device, command)).await {
                Ok(errors) if errors.is_empty() => None,
                Ok(errors) => Some(format!("{}: {}", command.light, errors.join("; "))),
                Err(_) => Some(format!("{}: no response within {:?}", command.light, command_timeout)),
            }
        }
    }))
    .await;

    CommandReport {
        attempted: commands.len(),
        failures: outcomes.into_iter().flatten().collect(),
    }
}
