mod analysis;
mod collaborators;
mod capture;
mod naming;
mod state;


pub use analysis::{AnalysisResult, Emotion};
pub use collaborators::{AnalysisService, FrameSource, LightReactor, ObjectStorage, UploadNamespace};
pub use capture::{CapturePipeline, PipelineMessage};
pub use naming::{image_name, image_name_now};
pub use state::{CaptureSource, PipelineState};
