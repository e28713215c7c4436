use super::orchestrator::RunningComponent;
use super::{ComponentState, FacelightOrchestrator};
use crate::control::ControlLoop;
use crate::device::persistence_worker;
use crate::error::{FacelightError, Result};
use crate::trigger::UdpTriggerListener;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl FacelightOrchestrator {
    /// Load persisted state and register the components that will run
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing facelight components");

        let records = self.store.load().await.map_err(|e| {
            error!(
                "Failed to load known bridges from {}: {}",
                self.store.path().display(),
                e
            );
            e
        })?;
        self.registry.load_records(records);

        let mut states = self.component_states.lock().await;
        states.insert("persistence".to_string(), ComponentState::Stopped);
        states.insert("control".to_string(), ComponentState::Stopped);
        if !self.config.trigger.bind_addr.is_empty() {
            states.insert("trigger".to_string(), ComponentState::Stopped);
        }
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all components, dependencies first
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting facelight");

        // Persistence first so the first connection is already recorded
        self.set_component_state("persistence", ComponentState::Starting)
            .await;
        let persist_rx = self
            .persist_rx
            .take()
            .ok_or_else(|| FacelightError::system("Persistence already started"))?;
        let store = self.store.clone();
        self.spawn_component("persistence", |cancel| {
            tokio::spawn(persistence_worker(persist_rx, store, cancel))
        })
        .await;
        self.set_component_state("persistence", ComponentState::Running)
            .await;

        self.set_component_state("control", ComponentState::Starting)
            .await;
        let collaborators = self
            .collaborators
            .take()
            .ok_or_else(|| FacelightError::system("Control loop already started"))?;
        let (mut control_loop, handle) = ControlLoop::new(
            &self.config,
            collaborators,
            self.registry.clone(),
            Arc::clone(&self.event_bus),
        );
        control_loop.bootstrap();
        self.spawn_component("control", |cancel| {
            tokio::spawn(async move {
                if let Err(e) = control_loop.run(cancel).await {
                    error!("Control loop failed: {}", e);
                }
            })
        })
        .await;
        self.control_handle = Some(handle.clone());
        self.set_component_state("control", ComponentState::Running)
            .await;
        info!("Control loop started");

        if !self.config.trigger.bind_addr.is_empty() {
            self.set_component_state("trigger", ComponentState::Starting)
                .await;
            let listener = UdpTriggerListener::bind(
                &self.config.trigger.bind_addr,
                self.config.trigger.channel.clone(),
                handle.clone(),
            )
            .await
            .map_err(|e| {
                error!("Failed to start trigger listener: {}", e);
                e
            })?;
            self.spawn_component("trigger", |cancel| tokio::spawn(listener.run(cancel)))
                .await;
            self.set_component_state("trigger", ComponentState::Running)
                .await;
        }

        #[cfg(feature = "keyboard")]
        if self.keyboard_enabled {
            self.set_component_state("keyboard", ComponentState::Starting)
                .await;
            let keyboard = crate::trigger::KeyboardInputHandler::new(handle);
            self.spawn_component("keyboard", move |cancel| {
                let task = keyboard.start();
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    keyboard.stop();
                    let _ = task.await;
                })
            })
            .await;
            self.set_component_state("keyboard", ComponentState::Running)
                .await;
        }

        info!("Facelight started successfully");
        Ok(())
    }

    async fn spawn_component<F>(&self, name: &str, spawn: F)
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let cancel = self.cancellation_token.child_token();
        let task = spawn(cancel.clone());
        self.components
            .lock()
            .await
            .insert(name.to_string(), RunningComponent { cancel, task });
    }
}
