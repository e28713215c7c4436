pub mod app;
pub mod bridge;
pub mod color;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod events;
pub mod generation;
pub mod local;
pub mod pipeline;
pub mod sim;
pub mod trigger;

pub use app::{ComponentState, FacelightOrchestrator, ShutdownReason};
pub use bridge::{ConnectionState, ConnectionStateMachine, DiscoveryCoordinator, DiscoveryState};
pub use color::{to_device_color, DeviceColor, Rgb};
pub use config::FacelightConfig;
pub use control::{Collaborators, ControlHandle, ControlLoop};
pub use device::{DeviceInfo, DeviceRegistry, DeviceTransport};
pub use error::{FacelightError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, FacelightEvent};
pub use pipeline::{
    AnalysisResult, AnalysisService, CapturePipeline, CaptureSource, Emotion, FrameSource,
    ObjectStorage, PipelineState,
};
