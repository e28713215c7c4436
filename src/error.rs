use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacelightError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Color component {component} out of range: {value} (expected 0..=255)")]
    InvalidColorComponent { component: &'static str, value: i32 },

    #[error("Connection to {active} is still active, release it before connecting to {requested}")]
    ConflictingConnection { active: String, requested: String },

    #[error("No bridge found after {attempts} discovery attempts")]
    DiscoveryExhausted { attempts: u32 },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Pairing required for bridge {device}")]
    PairingRequired { device: String },

    #[error("Pairing with bridge {device} timed out after {seconds}s")]
    HandshakeTimeout { device: String, seconds: u64 },

    #[error("Device transport error: {details}")]
    Transport { details: String },

    #[error("Collaborator {collaborator} failed: {details}")]
    Collaborator {
        collaborator: &'static str,
        details: String,
    },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

impl FacelightError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn transport<S: Into<String>>(details: S) -> Self {
        Self::Transport {
            details: details.into(),
        }
    }

    pub fn collaborator<S: Into<String>>(collaborator: &'static str, details: S) -> Self {
        Self::Collaborator {
            collaborator,
            details: details.into(),
        }
    }

    /// Message shown to the person in front of the camera.
    pub fn user_message(&self) -> String {
        match self {
            FacelightError::UploadFailed { .. } => "Upload failed!".to_string(),
            FacelightError::NoFaceDetected => "No face detected!".to_string(),
            FacelightError::DiscoveryExhausted { .. } => {
                "No bridge found in the local network".to_string()
            }
            FacelightError::PairingRequired { .. } => {
                "Press the link button on the bridge".to_string()
            }
            FacelightError::HandshakeTimeout { .. } => {
                "The link button was not pressed in time".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FacelightError>;
