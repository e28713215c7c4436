//! Scripted stand-ins for the bridge, camera and remote services. The
//! tests drive them directly and the binary uses the bridge and analysis
//! fakes until real network clients are wired in.

mod collaborators;
mod transport;

pub use collaborators::{SimulatedAnalysisService, SimulatedFrameSource, SimulatedObjectStorage};
pub use transport::SimulatedDeviceTransport;
