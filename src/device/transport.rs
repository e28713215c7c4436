use super::types::{DeviceInfo, DiscoveryOptions, HandshakeEvent, LightCommand, LightId};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Local-network protocol used to find and command bridges
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Run one discovery probe
    async fn discover(&self, options: &DiscoveryOptions) -> Result<Vec<DeviceInfo>>;

    /// Start the connection handshake; events arrive on the returned channel
    async fn connect(&self, device: &DeviceInfo) -> Result<mpsc::Receiver<HandshakeEvent>>;

    async fn disconnect(&self, device: &DeviceInfo) -> Result<()>;

    /// Fixtures currently known to the bridge
    async fn lights(&self, device: &DeviceInfo) -> Result<Vec<LightId>>;

    /// Update one fixture, returning every error the bridge reported
    async fn send_command(&self, device: &DeviceInfo, command: &LightCommand) -> Vec<String>;
}
