use serde::{Deserialize, Serialize};

/// Lifecycle of the single capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Capturing,
    Uploading,
    Analyzing,
    Reacting,
    Failed,
    AwaitingRetake,
}

impl PipelineState {
    /// A capture is in flight and must not be restarted
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Capturing
                | PipelineState::Uploading
                | PipelineState::Analyzing
                | PipelineState::Reacting
        )
    }
}

/// Where a capture request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureSource {
    /// Button or keyboard on this machine
    Local,
    /// Message on the trigger channel
    Remote,
}
