use super::{ComponentState, FacelightOrchestrator};
use crate::error::{FacelightError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

/// Stop order: trigger sources first, persistence last so the final
/// registry snapshot is written
const STOP_ORDER: [(&str, Duration); 4] = [
    ("keyboard", Duration::from_secs(2)),
    ("trigger", Duration::from_secs(2)),
    ("control", Duration::from_secs(5)),
    ("persistence", Duration::from_secs(5)),
];

impl FacelightOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;
        for (component, limit) in STOP_ORDER {
            if let Err(e) = self.stop_component(component, limit).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        // Catch anything still listening on the root token
        self.cancellation_token.cancel();

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&self, component: &str, limit: Duration) -> Result<()> {
        let Some(running) = self.components.lock().await.remove(component) else {
            return Ok(());
        };

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;
        running.cancel.cancel();

        match timeout(limit, running.task).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(FacelightError::component(
                    component.to_string(),
                    format!("task panicked: {}", e),
                ))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(FacelightError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}
