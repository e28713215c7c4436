use crate::bridge::{ConnectionMessage, DiscoveryMessage};
use crate::device::DeviceInfo;
use crate::error::Result;
use crate::pipeline::{CaptureSource, PipelineMessage};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

/// Sender side of the control loop's single inbound queue
pub type ControlSender = mpsc::UnboundedSender<ControlMessage>;

/// Everything that can change core state goes through this type
#[derive(Debug)]
pub enum ControlMessage {
    Command(Command),
    Discovery(DiscoveryMessage),
    Connection(ConnectionMessage),
    Pipeline(PipelineMessage),
}

/// Requests from the presentation layer and trigger sources
#[derive(Debug)]
pub enum Command {
    TriggerCapture {
        source: CaptureSource,
    },
    Retake,
    /// Upload an image for sharing; `None` shares the last captured photo
    Share {
        image: Option<Bytes>,
    },
    SwitchCamera,
    StartDiscovery,
    StopDiscovery,
    Connect {
        device: DeviceInfo,
        release_current: bool,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// The user switched a bridge off
    Decline {
        device: DeviceInfo,
    },
    Shutdown {
        reason: String,
    },
}

impl From<Command> for ControlMessage {
    fn from(command: Command) -> Self {
        ControlMessage::Command(command)
    }
}

impl From<DiscoveryMessage> for ControlMessage {
    fn from(message: DiscoveryMessage) -> Self {
        ControlMessage::Discovery(message)
    }
}

impl From<ConnectionMessage> for ControlMessage {
    fn from(message: ConnectionMessage) -> Self {
        ControlMessage::Connection(message)
    }
}

impl From<PipelineMessage> for ControlMessage {
    fn from(message: PipelineMessage) -> Self {
        ControlMessage::Pipeline(message)
    }
}
