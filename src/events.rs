use crate::device::DeviceInfo;
use crate::error::EventBusError;
use crate::pipeline::{CaptureSource, PipelineState};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Everything the core reports to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FacelightEvent {
    /// A capture was requested locally or over the trigger channel
    CaptureRequested { source: CaptureSource },
    /// The capture pipeline moved to a new state
    PipelineStateChanged { state: PipelineState },
    /// Short status line for the user
    StatusMessage { text: String },
    /// Text overlays to draw over the captured photo (empty clears them)
    OverlaysChanged { lines: Vec<String> },
    /// The user should take a new photo
    RetakeRequested,
    /// A shared image is reachable under this link
    ShareLinkReady { url: String },
    /// Camera access was refused
    CameraPermissionDenied,
    /// Front/back camera was switched
    CameraFlipped,
    /// Bridge discovery started
    DiscoveryStarted,
    /// Discovery found bridges
    DevicesDiscovered {
        devices: Vec<DeviceInfo>,
        attempt: u32,
    },
    /// Discovery gave up and no bridge was ever connected
    BridgeNotFound { attempts: u32 },
    /// A bridge accepted the connection
    DeviceConnected { device: DeviceInfo },
    /// A bridge was disconnected
    DeviceDisconnected { device: DeviceInfo },
    /// The link button on the bridge has to be pressed
    PairingRequired { device: DeviceInfo },
    /// Remaining share of the pairing countdown, 1.0 down to 0.0
    PairingProgress { device: DeviceInfo, fraction: f32 },
    /// The pairing countdown ran out without a connection
    PairingTimedOut { device: DeviceInfo },
    /// A light fan-out finished
    LightsUpdated { attempted: usize, failed: usize },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl FacelightEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            FacelightEvent::CaptureRequested { source } => {
                format!("Capture requested ({:?})", source)
            }
            FacelightEvent::PipelineStateChanged { state } => {
                format!("Pipeline state: {:?}", state)
            }
            FacelightEvent::StatusMessage { text } => format!("Status: {}", text),
            FacelightEvent::OverlaysChanged { lines } => {
                if lines.is_empty() {
                    "Overlays cleared".to_string()
                } else {
                    format!("Overlays: {}", lines.join(", "))
                }
            }
            FacelightEvent::RetakeRequested => "Retake requested".to_string(),
            FacelightEvent::ShareLinkReady { url } => format!("Share link ready: {}", url),
            FacelightEvent::CameraPermissionDenied => "Camera permission denied".to_string(),
            FacelightEvent::CameraFlipped => "Camera flipped".to_string(),
            FacelightEvent::DiscoveryStarted => "Bridge discovery started".to_string(),
            FacelightEvent::DevicesDiscovered { devices, attempt } => {
                format!(
                    "Discovered {} bridge(s) on attempt {}",
                    devices.len(),
                    attempt
                )
            }
            FacelightEvent::BridgeNotFound { attempts } => {
                format!("No bridge found after {} attempts", attempts)
            }
            FacelightEvent::DeviceConnected { device } => format!("Connected to {}", device),
            FacelightEvent::DeviceDisconnected { device } => {
                format!("Disconnected from {}", device)
            }
            FacelightEvent::PairingRequired { device } => {
                format!("Pairing required for {}", device)
            }
            FacelightEvent::PairingProgress { fraction, .. } => {
                format!("Pairing countdown at {:.0}%", fraction * 100.0)
            }
            FacelightEvent::PairingTimedOut { device } => {
                format!("Pairing with {} timed out", device)
            }
            FacelightEvent::LightsUpdated { attempted, failed } => {
                format!("Updated lights: {} sent, {} failed", attempted, failed)
            }
            FacelightEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            FacelightEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            FacelightEvent::CaptureRequested { .. } => "capture_requested",
            FacelightEvent::PipelineStateChanged { .. } => "pipeline_state_changed",
            FacelightEvent::StatusMessage { .. } => "status_message",
            FacelightEvent::OverlaysChanged { .. } => "overlays_changed",
            FacelightEvent::RetakeRequested => "retake_requested",
            FacelightEvent::ShareLinkReady { .. } => "share_link_ready",
            FacelightEvent::CameraPermissionDenied => "camera_permission_denied",
            FacelightEvent::CameraFlipped => "camera_flipped",
            FacelightEvent::DiscoveryStarted => "discovery_started",
            FacelightEvent::DevicesDiscovered { .. } => "devices_discovered",
            FacelightEvent::BridgeNotFound { .. } => "bridge_not_found",
            FacelightEvent::DeviceConnected { .. } => "device_connected",
            FacelightEvent::DeviceDisconnected { .. } => "device_disconnected",
            FacelightEvent::PairingRequired { .. } => "pairing_required",
            FacelightEvent::PairingProgress { .. } => "pairing_progress",
            FacelightEvent::PairingTimedOut { .. } => "pairing_timed_out",
            FacelightEvent::LightsUpdated { .. } => "lights_updated",
            FacelightEvent::SystemError { .. } => "system_error",
            FacelightEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for the presentation layer using a broadcast channel
pub struct EventBus {
    sender: broadcast::Sender<FacelightEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<FacelightEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Never blocks, so it is safe to call from the control loop.
    pub fn publish(&self, event: FacelightEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            FacelightEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            FacelightEvent::BridgeNotFound { attempts } => {
                warn!("No bridge found after {} attempts", attempts);
            }
            FacelightEvent::DeviceConnected { device } => {
                info!("Bridge {} connected", device);
            }
            FacelightEvent::PairingTimedOut { device } => {
                warn!("Pairing with {} timed out", device);
            }
            FacelightEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&FacelightEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &FacelightEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<FacelightEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<FacelightEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<FacelightEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<FacelightEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(FacelightEvent::StatusMessage {
                text: "Successfully uploaded.".to_string(),
            })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            FacelightEvent::StatusMessage { text } => assert_eq!(text, "Successfully uploaded."),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus.publish(FacelightEvent::RetakeRequested).is_err());
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["overlays_changed"]);
        let mut filtered = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus.publish(FacelightEvent::CameraFlipped).unwrap();
        event_bus
            .publish(FacelightEvent::OverlaysChanged {
                lines: vec!["Age: 30".to_string()],
            })
            .unwrap();

        let event = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "overlays_changed");
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_descriptions() {
        let cleared = FacelightEvent::OverlaysChanged { lines: vec![] };
        assert_eq!(cleared.description(), "Overlays cleared");

        let progress = FacelightEvent::PairingProgress {
            device: DeviceInfo::new("10.0.0.2", "abc"),
            fraction: 0.5,
        };
        assert_eq!(progress.description(), "Pairing countdown at 50%");
    }
}
