use super::types::{ComponentState, ShutdownReason};
use crate::config::FacelightConfig;
use crate::control::{Collaborators, ControlHandle};
use crate::device::{ConnectionRecord, DeviceRegistry, KnownDeviceStore};
use crate::error::Result;
use crate::events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A background task owned by the orchestrator
pub(super) struct RunningComponent {
    pub(super) cancel: CancellationToken,
    pub(super) task: JoinHandle<()>,
}

/// Wires the control loop, persistence and trigger sources together and
/// owns their lifecycle
pub struct FacelightOrchestrator {
    pub(super) config: FacelightConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) registry: DeviceRegistry,
    pub(super) store: KnownDeviceStore,

    // Consumed by start()
    pub(super) collaborators: Option<Collaborators>,
    pub(super) persist_rx: Option<mpsc::UnboundedReceiver<Vec<ConnectionRecord>>>,

    pub(super) control_handle: Option<ControlHandle>,
    pub(super) components: Mutex<HashMap<String, RunningComponent>>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl FacelightOrchestrator {
    pub fn new(config: FacelightConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let registry = DeviceRegistry::with_persistence(persist_tx);
        let store = KnownDeviceStore::new(&config.storage.known_devices_path);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let keyboard_enabled = cfg!(feature = "keyboard") && config.trigger.keyboard;

        Ok(Self {
            config,
            event_bus,
            registry,
            store,
            collaborators: Some(collaborators),
            persist_rx: Some(persist_rx),
            control_handle: None,
            components: Mutex::new(HashMap::new()),
            keyboard_enabled,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = cfg!(feature = "keyboard") && enabled;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Handle for issuing commands; available once started
    pub fn control_handle(&self) -> Option<ControlHandle> {
        self.control_handle.clone()
    }
}
