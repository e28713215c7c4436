use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::device::DiscoveryMethod;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FacelightConfig {
    pub discovery: DiscoveryConfig,
    pub connection: ConnectionConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub camera: CameraConfig,
    pub trigger: TriggerConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscoveryConfig {
    /// Retries after the first probe before discovery gives up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Discovery methods handed to the transport
    #[serde(default = "default_discovery_methods")]
    pub methods: Vec<DiscoveryMethod>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    /// Delay before a declined bridge is actually disconnected
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,

    /// Countdown shown while waiting for the link button
    #[serde(default = "default_pairing_timeout_seconds")]
    pub pairing_timeout_seconds: u64,

    /// Length of one pairing countdown tick
    #[serde(default = "default_pairing_tick_ms")]
    pub pairing_tick_ms: u64,

    /// Upper bound for a single light command
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Connect to the first discovered bridge when nothing is connected
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Delay between a failed capture and the retake prompt
    #[serde(default = "default_retake_delay_ms")]
    pub retake_delay_ms: u64,

    /// Delay before overlays are cleared on retake
    #[serde(default = "default_overlay_clear_delay_ms")]
    pub overlay_clear_delay_ms: u64,

    /// Upload attempts per capture (1 = no retry)
    #[serde(default = "default_upload_max_attempts")]
    pub upload_max_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// File holding previously connected bridges
    #[serde(default = "default_known_devices_path")]
    pub known_devices_path: String,

    /// Directory used by the local object storage
    #[serde(default = "default_upload_root")]
    pub upload_root: String,

    /// Base URL under which uploaded images are reachable
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// JPEG file served as the current camera frame
    #[serde(default = "default_still_image_path")]
    pub still_image_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TriggerConfig {
    /// Channel name that triggers a capture
    #[serde(default = "default_trigger_channel")]
    pub channel: String,

    /// UDP address the remote trigger listens on (empty disables it)
    #[serde(default = "default_trigger_bind_addr")]
    pub bind_addr: String,

    /// Enable keyboard shortcuts
    #[serde(default = "default_keyboard")]
    pub keyboard: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ConnectionConfig {
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn pairing_tick(&self) -> Duration {
        Duration::from_millis(self.pairing_tick_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl PipelineConfig {
    pub fn retake_delay(&self) -> Duration {
        Duration::from_millis(self.retake_delay_ms)
    }

    pub fn overlay_clear_delay(&self) -> Duration {
        Duration::from_millis(self.overlay_clear_delay_ms)
    }
}

impl FacelightConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("facelight.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let methods: Vec<String> = default_discovery_methods()
            .iter()
            .map(|m| m.as_str().to_string())
            .collect();

        let settings = Config::builder()
            .set_default("discovery.max_attempts", default_max_attempts())?
            .set_default("discovery.methods", methods)?
            .set_default(
                "connection.disconnect_grace_ms",
                default_disconnect_grace_ms(),
            )?
            .set_default(
                "connection.pairing_timeout_seconds",
                default_pairing_timeout_seconds(),
            )?
            .set_default("connection.pairing_tick_ms", default_pairing_tick_ms())?
            .set_default(
                "connection.command_timeout_ms",
                default_command_timeout_ms(),
            )?
            .set_default("connection.auto_connect", default_auto_connect())?
            .set_default("pipeline.retake_delay_ms", default_retake_delay_ms())?
            .set_default(
                "pipeline.overlay_clear_delay_ms",
                default_overlay_clear_delay_ms(),
            )?
            .set_default(
                "pipeline.upload_max_attempts",
                default_upload_max_attempts(),
            )?
            .set_default("storage.known_devices_path", default_known_devices_path())?
            .set_default("storage.upload_root", default_upload_root())?
            .set_default("storage.public_base_url", default_public_base_url())?
            .set_default("camera.still_image_path", default_still_image_path())?
            .set_default("trigger.channel", default_trigger_channel())?
            .set_default("trigger.bind_addr", default_trigger_bind_addr())?
            .set_default("trigger.keyboard", default_keyboard())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with FACELIGHT_ prefix
            .add_source(Environment::with_prefix("FACELIGHT").separator("__"))
            .build()?;

        let config: FacelightConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.max_attempts == 0 {
            return Err(ConfigError::Message(
                "Discovery max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.discovery.methods.is_empty() {
            return Err(ConfigError::Message(
                "At least one discovery method is required".to_string(),
            ));
        }

        if self.connection.pairing_timeout_seconds == 0 || self.connection.pairing_tick_ms == 0 {
            return Err(ConfigError::Message(
                "Pairing countdown must be greater than 0".to_string(),
            ));
        }

        if self.connection.command_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Light command timeout must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.upload_max_attempts == 0 {
            return Err(ConfigError::Message(
                "Pipeline upload_max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.trigger.channel.trim().is_empty() {
            return Err(ConfigError::Message(
                "Trigger channel name must not be empty".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FacelightConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig {
                max_attempts: default_max_attempts(),
                methods: default_discovery_methods(),
            },
            connection: ConnectionConfig {
                disconnect_grace_ms: default_disconnect_grace_ms(),
                pairing_timeout_seconds: default_pairing_timeout_seconds(),
                pairing_tick_ms: default_pairing_tick_ms(),
                command_timeout_ms: default_command_timeout_ms(),
                auto_connect: default_auto_connect(),
            },
            pipeline: PipelineConfig {
                retake_delay_ms: default_retake_delay_ms(),
                overlay_clear_delay_ms: default_overlay_clear_delay_ms(),
                upload_max_attempts: default_upload_max_attempts(),
            },
            storage: StorageConfig {
                known_devices_path: default_known_devices_path(),
                upload_root: default_upload_root(),
                public_base_url: default_public_base_url(),
            },
            camera: CameraConfig {
                still_image_path: default_still_image_path(),
            },
            trigger: TriggerConfig {
                channel: default_trigger_channel(),
                bind_addr: default_trigger_bind_addr(),
                keyboard: default_keyboard(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_max_attempts() -> u32 {
    20
}
fn default_discovery_methods() -> Vec<DiscoveryMethod> {
    vec![
        DiscoveryMethod::IpScan,
        DiscoveryMethod::Nupnp,
        DiscoveryMethod::Upnp,
    ]
}

fn default_disconnect_grace_ms() -> u64 {
    1000
}
fn default_pairing_timeout_seconds() -> u64 {
    30
}
fn default_pairing_tick_ms() -> u64 {
    1000
}
fn default_command_timeout_ms() -> u64 {
    5000
}
fn default_auto_connect() -> bool {
    true
}

fn default_retake_delay_ms() -> u64 {
    1000
}
fn default_overlay_clear_delay_ms() -> u64 {
    500
}
fn default_upload_max_attempts() -> u32 {
    1
}

fn default_known_devices_path() -> String {
    "./known_bridges.json".to_string()
}
fn default_upload_root() -> String {
    "./uploads".to_string()
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_still_image_path() -> String {
    "./still.jpg".to_string()
}

fn default_trigger_channel() -> String {
    "shoot_picture".to_string()
}
fn default_trigger_bind_addr() -> String {
    "0.0.0.0:7878".to_string()
}
fn default_keyboard() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}
