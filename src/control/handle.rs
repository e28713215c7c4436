use super::messages::{Command, ControlMessage, ControlSender};
use crate::device::DeviceInfo;
use crate::error::{FacelightError, Result};
use crate::pipeline::CaptureSource;
use bytes::Bytes;
use tokio::sync::oneshot;

/// Cloneable front door to the control loop.
///
/// Every method only enqueues a command; state is never touched from the
/// caller's task.
#[derive(Clone)]
pub struct ControlHandle {
    tx: ControlSender,
}

impl ControlHandle {
    pub(crate) fn new(tx: ControlSender) -> Self {
        Self { tx }
    }

    pub fn trigger_capture(&self, source: CaptureSource) -> Result<()> {
        self.send(Command::TriggerCapture { source })
    }

    pub fn retake(&self) -> Result<()> {
        self.send(Command::Retake)
    }

    pub fn share(&self, image: Option<Bytes>) -> Result<()> {
        self.send(Command::Share { image })
    }

    pub fn switch_camera(&self) -> Result<()> {
        self.send(Command::SwitchCamera)
    }

    pub fn start_discovery(&self) -> Result<()> {
        self.send(Command::StartDiscovery)
    }

    pub fn stop_discovery(&self) -> Result<()> {
        self.send(Command::StopDiscovery)
    }

    /// Connect to `device` and wait until the request was accepted.
    ///
    /// With `release_current` an active connection to another bridge is torn
    /// down first; otherwise that case fails with `ConflictingConnection`.
    pub async fn connect(&self, device: DeviceInfo, release_current: bool) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Connect {
            device,
            release_current,
            reply: Some(reply),
        })?;

        response
            .await
            .map_err(|_| FacelightError::system("Control loop dropped the connect request"))?
    }

    pub fn decline(&self, device: DeviceInfo) -> Result<()> {
        self.send(Command::Decline { device })
    }

    pub fn shutdown<S: Into<String>>(&self, reason: S) -> Result<()> {
        self.send(Command::Shutdown {
            reason: reason.into(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(ControlMessage::Command(command))
            .map_err(|_| FacelightError::system("Control loop is not running"))
    }
}
