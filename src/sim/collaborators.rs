use crate::error::{FacelightError, Result};
use crate::pipeline::{
    AnalysisResult, AnalysisService, Emotion, FrameSource, ObjectStorage, UploadNamespace,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Camera stand-in returning a fixed frame
pub struct SimulatedFrameSource {
    frame: Bytes,
    granted: bool,
    failing: AtomicBool,
    captures: AtomicU32,
    switches: AtomicU32,
    resumes: AtomicU32,
}

impl SimulatedFrameSource {
    pub fn new(frame: impl Into<Bytes>) -> Self {
        Self {
            frame: frame.into(),
            granted: true,
            failing: AtomicBool::new(false),
            captures: AtomicU32::new(0),
            switches: AtomicU32::new(0),
            resumes: AtomicU32::new(0),
        }
    }

    pub fn denied(mut self) -> Self {
        self.granted = false;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn switches(&self) -> u32 {
        self.switches.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> u32 {
        self.resumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for SimulatedFrameSource {
    async fn request_permission(&self) -> bool {
        self.granted
    }

    async fn capture_still(&self) -> Result<Bytes> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FacelightError::collaborator("camera", "no frame available"));
        }
        Ok(self.frame.clone())
    }

    async fn switch_camera(&self) -> Result<()> {
        self.switches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory object storage that can be told to fail the next uploads
pub struct SimulatedObjectStorage {
    base_url: String,
    failures_remaining: AtomicU32,
    delay: Duration,
    uploads: Mutex<Vec<(String, UploadNamespace, usize)>>,
}

impl SimulatedObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            failures_remaining: AtomicU32::new(0),
            delay: Duration::ZERO,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Every upload attempt as (name, namespace, size)
    pub fn uploads(&self) -> Vec<(String, UploadNamespace, usize)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl ObjectStorage for SimulatedObjectStorage {
    async fn upload(&self, image: Bytes, name: &str, namespace: UploadNamespace) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.uploads
            .lock()
            .push((name.to_string(), namespace, image.len()));

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FacelightError::UploadFailed {
                reason: "simulated storage rejected the upload".to_string(),
            });
        }

        let prefix = match namespace {
            UploadNamespace::Analysis => "uploads",
            UploadNamespace::Share => "uploads/share",
        };
        Ok(format!("{}/{}/{}", self.base_url, prefix, name))
    }
}

/// Analysis service replaying scripted answers, or cycling through the
/// emotions when the script is empty
pub struct SimulatedAnalysisService {
    script: Mutex<VecDeque<Result<Option<AnalysisResult>>>>,
    requests: Mutex<Vec<String>>,
    cycle: AtomicUsize,
}

impl Default for SimulatedAnalysisService {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAnalysisService {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            cycle: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, result: Result<Option<AnalysisResult>>) {
        self.script.lock().push_back(result);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    fn next_cycled(&self) -> AnalysisResult {
        let n = self.cycle.fetch_add(1, Ordering::SeqCst);
        let emotion = Emotion::NAMED[n % Emotion::NAMED.len()];
        AnalysisResult {
            age: Some(20 + (n as u32 * 7) % 50),
            gender: Some(if n % 2 == 0 { "female" } else { "male" }.to_string()),
            dominant_emotion: Some(emotion),
        }
    }
}

#[async_trait]
impl AnalysisService for SimulatedAnalysisService {
    async fn analyze(&self, url: &str) -> Result<Option<AnalysisResult>> {
        self.requests.lock().push(url.to_string());
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(Some(self.next_cycled())),
        }
    }
}
