use crate::control::ControlHandle;
use crate::error::Result;
use crate::pipeline::CaptureSource;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM: usize = 512;
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Remote shutter: a datagram whose payload is the channel name triggers a
/// capture, exactly like pressing the local button
pub struct UdpTriggerListener {
    socket: UdpSocket,
    channel: String,
    handle: ControlHandle,
}

impl UdpTriggerListener {
    pub async fn bind(addr: &str, channel: impl Into<String>, handle: ControlHandle) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let channel = channel.into();
        info!(
            "Listening for '{}' triggers on {}",
            channel,
            socket.local_addr()?
        );

        Ok(Self {
            socket,
            channel,
            handle,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut consecutive_errors = 0u32;

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    consecutive_errors = 0;
                    if !self.matches_channel(&buf[..len]) {
                        debug!("Ignoring trigger datagram from {}", peer);
                        continue;
                    }
                    info!("Remote trigger from {}", peer);
                    if self.handle.trigger_capture(CaptureSource::Remote).is_err() {
                        warn!("Control loop gone, stopping trigger listener");
                        break;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    error!(
                        "Trigger socket error (attempt {}): {}",
                        consecutive_errors, e
                    );
                    if !pause_after_error(&cancel).await {
                        break;
                    }
                }
            }
        }

        info!("Trigger listener stopped");
    }

    fn matches_channel(&self, payload: &[u8]) -> bool {
        std::str::from_utf8(payload)
            .map(|text| text.trim() == self.channel)
            .unwrap_or(false)
    }
}

/// Wait before reading again so a failing socket does not spin. Returns
/// `false` when cancelled meanwhile.
async fn pause_after_error(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(ERROR_BACKOFF) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Command, ControlMessage};
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Instant};

    #[tokio::test]
    async fn test_channel_datagram_triggers_capture() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = UdpTriggerListener::bind("127.0.0.1:0", "shoot_picture", ControlHandle::new(tx))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.run(cancel.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"something_else", addr).await.unwrap();
        sender.send_to(b"shoot_picture\n", addr).await.unwrap();

        let message = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            message,
            ControlMessage::Command(Command::TriggerCapture {
                source: CaptureSource::Remote
            })
        ));
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_socket_error_backs_off() {
        let cancel = CancellationToken::new();

        let started = Instant::now();
        assert!(pause_after_error(&cancel).await);
        assert!(started.elapsed() >= ERROR_BACKOFF);

        cancel.cancel();
        let started = Instant::now();
        assert!(!pause_after_error(&cancel).await);
        assert!(started.elapsed() < ERROR_BACKOFF);
    }
}
