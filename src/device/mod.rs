mod registry;
mod store;
mod transport;
mod types;

pub use registry::DeviceRegistry;
pub use store::{persistence_worker, KnownDeviceStore};
pub use transport::DeviceTransport;
pub use types::{
    CommandReport, ConnectionRecord, DeviceInfo, DiscoveryMethod, DiscoveryOptions,
    HandshakeEvent, LightCommand, LightId,
};
