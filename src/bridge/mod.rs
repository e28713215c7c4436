mod connection;
mod discovery;

#[cfg(test)]
mod tests;

pub use connection::{ConnectionMessage, ConnectionState, ConnectionStateMachine};
pub use discovery::{
    DiscoveryCoordinator, DiscoveryMessage, DiscoveryOutcome, DiscoverySession, DiscoveryState,
};
