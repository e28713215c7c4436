use super::analysis::AnalysisResult;
use super::collaborators::{AnalysisService, FrameSource, LightReactor, ObjectStorage, UploadNamespace};
use super::naming::image_name_now;
use super::state::{CaptureSource, PipelineState};
use crate::config::PipelineConfig;
use crate::control::{ControlMessage, ControlSender};
use crate::error::{FacelightError, Result};
use crate::events::{EventBus, FacelightEvent};
use crate::generation::{Generation, GenerationCounter};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const UPLOAD_SUCCEEDED: &str = "Successfully uploaded.";
const NO_IMAGE_CAPTURED: &str = "No Image Captured!";

/// Completions reported back to the pipeline by its collaborators
#[derive(Debug)]
pub enum PipelineMessage {
    FrameCaptured {
        generation: Generation,
        result: Result<Bytes>,
    },
    UploadCompleted {
        generation: Generation,
        result: Result<String>,
    },
    AnalysisCompleted {
        generation: Generation,
        result: Result<Option<AnalysisResult>>,
    },
    RetakeDue {
        generation: Generation,
    },
    OverlayClearDue {
        generation: Generation,
    },
    ShareCompleted {
        result: Result<String>,
    },
    CameraSwitched {
        result: Result<()>,
    },
    PermissionResolved {
        granted: bool,
    },
}

/// Capture, upload, analyse, react.
///
/// Only one capture session exists. Every stage is tagged with the generation
/// current when the session started, so `reset` and `retake` turn any
/// in-flight completion into a no-op.
pub struct CapturePipeline {
    frame_source: Arc<dyn FrameSource>,
    storage: Arc<dyn ObjectStorage>,
    analysis: Arc<dyn AnalysisService>,
    event_bus: Arc<EventBus>,
    tx: ControlSender,
    config: PipelineConfig,
    state: PipelineState,
    generations: GenerationCounter,
    last_capture: Option<Bytes>,
    overlays: Vec<String>,
    permission: Option<bool>,
}

impl CapturePipeline {
    pub fn new(
        frame_source: Arc<dyn FrameSource>,
        storage: Arc<dyn ObjectStorage>,
        analysis: Arc<dyn AnalysisService>,
        event_bus: Arc<EventBus>,
        tx: ControlSender,
        config: PipelineConfig,
    ) -> Self {
        Self {
            frame_source,
            storage,
            analysis,
            event_bus,
            tx,
            config,
            state: PipelineState::Idle,
            generations: GenerationCounter::new(),
            last_capture: None,
            overlays: Vec::new(),
            permission: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn overlays(&self) -> &[String] {
        &self.overlays
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    /// `None` until the frame source answered the permission request
    pub fn camera_permission(&self) -> Option<bool> {
        self.permission
    }

    pub fn request_permission(&self) {
        let frame_source = Arc::clone(&self.frame_source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let granted = frame_source.request_permission().await;
            let _ = tx.send(PipelineMessage::PermissionResolved { granted }.into());
        });
    }

    /// Start a capture session. Ignored while a session is in flight. A
    /// finished session goes back to `Idle` first and the camera is resumed
    /// before the new shot.
    pub fn trigger_capture(&mut self, source: CaptureSource) -> bool {
        if self.state.is_busy() {
            debug!("Capture requested while {:?}, ignoring", self.state);
            return false;
        }
        if self.permission == Some(false) {
            warn!("Capture requested without camera permission");
            let _ = self.event_bus.publish(FacelightEvent::CameraPermissionDenied);
            return false;
        }

        let resume = self.state != PipelineState::Idle;
        if resume {
            debug!("Starting over from {:?}", self.state);
            self.set_state(PipelineState::Idle);
        }

        let generation = self.generations.advance();
        info!("Capture triggered from {:?} ({})", source, generation);
        let _ = self
            .event_bus
            .publish(FacelightEvent::CaptureRequested { source });
        self.clear_overlays();
        self.set_state(PipelineState::Capturing);

        let frame_source = Arc::clone(&self.frame_source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if resume {
                if let Err(e) = frame_source.resume().await {
                    warn!("Failed to resume camera: {}", e);
                }
            }
            let result = frame_source.capture_still().await;
            let _ = tx.send(PipelineMessage::FrameCaptured { generation, result }.into());
        });

        true
    }

    /// Go back to `Idle` for a new shot. Overlays disappear after a short
    /// delay and the camera is resumed.
    pub fn retake(&mut self) {
        if self.state == PipelineState::Idle {
            debug!("Retake requested while idle, ignoring");
            return;
        }

        let generation = self.generations.advance();
        info!("Retake requested ({})", generation);
        self.set_state(PipelineState::Idle);
        self.resume_camera();

        let delay = self.config.overlay_clear_delay();
        self.schedule(delay, PipelineMessage::OverlayClearDue { generation });
    }

    /// Abandon whatever is in flight and return to `Idle` at once
    pub fn reset(&mut self) {
        let generation = self.generations.advance();
        debug!("Pipeline reset ({})", generation);
        self.clear_overlays();
        if self.state != PipelineState::Idle {
            self.set_state(PipelineState::Idle);
            self.resume_camera();
        }
    }

    /// Upload `image` (or the last captured photo) to the share namespace
    pub fn share(&mut self, image: Option<Bytes>) -> bool {
        let Some(image) = image.or_else(|| self.last_capture.clone()) else {
            warn!("Share requested before anything was captured");
            self.status(NO_IMAGE_CAPTURED);
            return false;
        };

        let storage = Arc::clone(&self.storage);
        let tx = self.tx.clone();
        let max_attempts = self.config.upload_max_attempts;
        let name = image_name_now();
        info!("Sharing {}", name);

        tokio::spawn(async move {
            let result =
                upload_with_retry(storage, image, &name, UploadNamespace::Share, max_attempts).await;
            let _ = tx.send(PipelineMessage::ShareCompleted { result }.into());
        });

        true
    }

    pub fn switch_camera(&self) {
        let frame_source = Arc::clone(&self.frame_source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = frame_source.switch_camera().await;
            let _ = tx.send(PipelineMessage::CameraSwitched { result }.into());
        });
    }

    pub fn handle_message(&mut self, message: PipelineMessage, reactor: &mut dyn LightReactor) {
        match message {
            PipelineMessage::FrameCaptured { generation, result } => {
                if self.is_stale(generation, PipelineState::Capturing) {
                    return;
                }
                self.on_frame_captured(generation, result);
            }
            PipelineMessage::UploadCompleted { generation, result } => {
                if self.is_stale(generation, PipelineState::Uploading) {
                    return;
                }
                self.on_upload_completed(generation, result);
            }
            PipelineMessage::AnalysisCompleted { generation, result } => {
                if self.is_stale(generation, PipelineState::Analyzing) {
                    return;
                }
                self.on_analysis_completed(generation, result, reactor);
            }
            PipelineMessage::RetakeDue { generation } => {
                if self.is_stale(generation, PipelineState::Failed) {
                    return;
                }
                self.set_state(PipelineState::AwaitingRetake);
                let _ = self.event_bus.publish(FacelightEvent::RetakeRequested);
            }
            PipelineMessage::OverlayClearDue { generation } => {
                if self.generations.is_current(generation) {
                    self.clear_overlays();
                }
            }
            PipelineMessage::ShareCompleted { result } => match result {
                Ok(url) => {
                    info!("Share link ready: {}", url);
                    let _ = self.event_bus.publish(FacelightEvent::ShareLinkReady { url });
                }
                Err(e) => {
                    error!("Share upload failed: {}", e);
                    self.status(&e.user_message());
                }
            },
            PipelineMessage::CameraSwitched { result } => match result {
                Ok(()) => {
                    let _ = self.event_bus.publish(FacelightEvent::CameraFlipped);
                }
                Err(e) => warn!("Failed to switch camera: {}", e),
            },
            PipelineMessage::PermissionResolved { granted } => {
                self.permission = Some(granted);
                if granted {
                    info!("Camera permission granted");
                } else {
                    warn!("Camera permission denied");
                    let _ = self.event_bus.publish(FacelightEvent::CameraPermissionDenied);
                }
            }
        }
    }

    fn on_frame_captured(&mut self, generation: Generation, result: Result<Bytes>) {
        let image = match result {
            Ok(image) => image,
            Err(e) => {
                error!("Frame capture failed: {}", e);
                self.status(NO_IMAGE_CAPTURED);
                self.fail(generation);
                return;
            }
        };

        self.last_capture = Some(image.clone());
        self.set_state(PipelineState::Uploading);

        let storage = Arc::clone(&self.storage);
        let tx = self.tx.clone();
        let max_attempts = self.config.upload_max_attempts;
        let name = image_name_now();
        debug!("Uploading {} ({} bytes)", name, image.len());

        tokio::spawn(async move {
            let result =
                upload_with_retry(storage, image, &name, UploadNamespace::Analysis, max_attempts)
                    .await;
            let _ = tx.send(PipelineMessage::UploadCompleted { generation, result }.into());
        });
    }

    fn on_upload_completed(&mut self, generation: Generation, result: Result<String>) {
        let url = match result {
            Ok(url) => url,
            Err(e) => {
                error!("{}", e);
                self.status(&e.user_message());
                self.fail(generation);
                return;
            }
        };

        info!("Photo uploaded to {}", url);
        self.status(UPLOAD_SUCCEEDED);
        self.set_state(PipelineState::Analyzing);

        let analysis = Arc::clone(&self.analysis);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = analysis.analyze(&url).await;
            let _ = tx.send(PipelineMessage::AnalysisCompleted { generation, result }.into());
        });
    }

    fn on_analysis_completed(
        &mut self,
        generation: Generation,
        result: Result<Option<AnalysisResult>>,
        reactor: &mut dyn LightReactor,
    ) {
        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => {
                let failure = FacelightError::AnalysisFailed {
                    reason: e.to_string(),
                };
                error!("{}", failure);
                self.status(&failure.user_message());
                self.fail(generation);
                return;
            }
        };

        let face = analysis.and_then(|a| Some((a.overlay_lines()?, a.dominant_emotion?)));
        let Some((lines, emotion)) = face else {
            let failure = FacelightError::NoFaceDetected;
            info!("{}", failure);
            self.status(&failure.user_message());
            reactor.apply_default_pattern();
            self.fail(generation);
            return;
        };

        info!("Face analysed: {}", lines.join(", "));
        self.overlays = lines.clone();
        let _ = self
            .event_bus
            .publish(FacelightEvent::OverlaysChanged { lines });

        self.set_state(PipelineState::Reacting);
        reactor.apply_emotion_reaction(emotion);
        self.set_state(PipelineState::AwaitingRetake);
    }

    /// Enter `Failed` and offer a retake after the grace delay
    fn fail(&mut self, generation: Generation) {
        self.set_state(PipelineState::Failed);
        let delay = self.config.retake_delay();
        self.schedule(delay, PipelineMessage::RetakeDue { generation });
    }

    fn is_stale(&self, generation: Generation, expected: PipelineState) -> bool {
        if self.generations.is_current(generation) && self.state == expected {
            return false;
        }
        debug!(
            "Discarding stale pipeline completion ({}, expected {:?}, now {:?})",
            generation, expected, self.state
        );
        true
    }

    fn schedule(&self, delay: Duration, message: PipelineMessage) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let message: ControlMessage = message.into();
            let _ = tx.send(message);
        });
    }

    fn resume_camera(&self) {
        let frame_source = Arc::clone(&self.frame_source);
        tokio::spawn(async move {
            if let Err(e) = frame_source.resume().await {
                warn!("Failed to resume camera: {}", e);
            }
        });
    }

    fn clear_overlays(&mut self) {
        if self.overlays.is_empty() {
            return;
        }
        self.overlays.clear();
        let _ = self
            .event_bus
            .publish(FacelightEvent::OverlaysChanged { lines: Vec::new() });
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state == state {
            return;
        }
        debug!("Pipeline state {:?} -> {:?}", self.state, state);
        self.state = state;
        let _ = self
            .event_bus
            .publish(FacelightEvent::PipelineStateChanged { state });
    }

    fn status(&self, text: &str) {
        let _ = self.event_bus.publish(FacelightEvent::StatusMessage {
            text: text.to_string(),
        });
    }
}

async fn upload_with_retry(
    storage: Arc<dyn ObjectStorage>,
    image: Bytes,
    name: &str,
    namespace: UploadNamespace,
    max_attempts: u32,
) -> Result<String> {
    let mut attempt = 1;
    loop {
        match storage.upload(image.clone(), name, namespace).await {
            Ok(url) => return Ok(url),
            Err(e) if attempt < max_attempts => {
                warn!("Upload attempt {}/{} failed: {}", attempt, max_attempts, e);
                attempt += 1;
            }
            Err(e) => {
                return Err(match e {
                    FacelightError::UploadFailed { .. } => e,
                    other => FacelightError::UploadFailed {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}
