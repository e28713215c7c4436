use super::{FacelightOrchestrator, ShutdownReason};
use crate::error::{FacelightError, Result};
use crate::events::FacelightEvent;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{error, info};

type SharedShutdown = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl FacelightOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Facelight is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| FacelightError::system("Shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| FacelightError::system("Shutdown receiver already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.watch_shutdown_requests(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| FacelightError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Facelight shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: SharedShutdown) {
        // SIGTERM (systemd stop)
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(&shutdown_sender, ShutdownReason::Signal("SIGTERM".to_string()))
                        .await;
                }
            });
        }

        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string()))
                    .await;
            }
        });
    }

    /// The control loop announces `q` presses and other shutdown commands on
    /// the event bus
    fn watch_shutdown_requests(&self, shutdown_sender: SharedShutdown) {
        let mut events = self.event_bus.subscribe();
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = events.recv() => event,
                };
                match event {
                    Ok(FacelightEvent::ShutdownRequested { reason, .. }) => {
                        send_shutdown(&shutdown_sender, ShutdownReason::UserRequest(reason)).await;
                        return;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }
}

async fn send_shutdown(shutdown_sender: &SharedShutdown, reason: ShutdownReason) {
    if let Some(sender) = shutdown_sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
