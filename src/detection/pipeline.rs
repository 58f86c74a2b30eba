use super::payload::{DetectedFace, DrawingPayload};
use crate::budget::{DetectionBackend, ResourceBudget};
use crate::error::PipelineError;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How much of the current frame a video source can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// One frame handed to the detection pipeline
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// The live camera element detection reads from
pub trait VideoSource: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    fn video_width(&self) -> u32;

    fn video_height(&self) -> u32;

    fn current_frame(&self) -> Option<VideoFrame>;

    /// Whether a frame with usable dimensions is available
    fn is_usable(&self) -> bool {
        self.ready_state() >= ReadyState::HaveEnoughData
            && self.video_width() > 0
            && self.video_height() > 0
    }
}

/// Settings the pipeline is initialized with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub backend: DetectionBackend,
    pub max_faces: u32,
    pub refine_landmarks: bool,
}

impl From<&ResourceBudget> for PipelineOptions {
    fn from(budget: &ResourceBudget) -> Self {
        Self {
            backend: budget.detection_backend,
            max_faces: budget.max_detected_faces,
            refine_landmarks: budget.refine_landmarks,
        }
    }
}

/// The opaque face-landmark model
#[async_trait]
pub trait DetectionPipeline: Send + Sync {
    /// Load the model. Returns false when it cannot run on `options.backend`.
    async fn initialize(&self, options: PipelineOptions) -> bool;

    async fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<DetectedFace>, PipelineError>;

    /// Free model resources
    fn release(&self);
}

/// Draws detection results over the video
pub trait OverlayRenderer: Send + Sync {
    fn render(&self, payload: &DrawingPayload);

    fn clear(&self);

    /// Called after every rendered frame
    fn face_presence(&self, _present: bool) {}
}

/// Reports the process's current memory use
pub trait MemoryProbe: Send + Sync {
    fn used_mb(&self) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Idle,
    Ready,
    Failed,
}

#[derive(Debug)]
struct LeaseCount {
    refs: usize,
    state: InitState,
}

struct SharedInner {
    pipeline: Arc<dyn DetectionPipeline>,
    count: Mutex<LeaseCount>,
    init_gate: tokio::sync::Mutex<()>,
}

impl SharedInner {
    /// Drop one reference. Disposes the pipeline when it was the last one.
    fn release_one(&self) {
        let dispose = {
            let mut count = self.count.lock();
            count.refs = count.refs.saturating_sub(1);
            if count.refs > 0 {
                false
            } else {
                let was_ready = count.state == InitState::Ready;
                count.state = InitState::Idle;
                was_ready
            }
        };

        if dispose {
            info!("Last pipeline lease released, disposing detection pipeline");
            self.pipeline.release();
        }
    }
}

/// One detection pipeline shared by every consumer through counted leases.
///
/// The first acquire initializes it, concurrent acquirers wait for that same
/// initialization, and the last lease to go disposes it.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<SharedInner>,
}

impl SharedPipeline {
    pub fn new(pipeline: Arc<dyn DetectionPipeline>) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                pipeline,
                count: Mutex::new(LeaseCount {
                    refs: 0,
                    state: InitState::Idle,
                }),
                init_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub async fn acquire(&self, options: PipelineOptions) -> Result<PipelineLease, PipelineError> {
        // Counted before any await so a concurrent last release cannot dispose under us
        let refs = {
            let mut count = self.inner.count.lock();
            count.refs += 1;
            count.refs
        };
        debug!(refs, "Pipeline lease requested");

        let _gate = self.inner.init_gate.lock().await;

        let state = self.inner.count.lock().state;
        let ready = match state {
            InitState::Ready => true,
            InitState::Failed => false,
            InitState::Idle => {
                info!(backend = ?options.backend, "Initializing detection pipeline");
                let ok = self.inner.pipeline.initialize(options).await;
                self.inner.count.lock().state = if ok {
                    InitState::Ready
                } else {
                    InitState::Failed
                };
                ok
            }
        };

        if !ready {
            error!(backend = ?options.backend, "Detection pipeline failed to initialize");
            self.inner.release_one();
            return Err(PipelineError::Initialization {
                details: format!("pipeline could not start on the {:?} backend", options.backend),
            });
        }

        Ok(PipelineLease {
            inner: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
        })
    }

    /// Number of outstanding leases, including acquirers still waiting on initialization
    pub fn ref_count(&self) -> usize {
        self.inner.count.lock().refs
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.count.lock().state == InitState::Ready
    }
}

/// A counted claim on the shared pipeline. Released once, explicitly or on drop.
pub struct PipelineLease {
    inner: Arc<SharedInner>,
    released: AtomicBool,
}

impl PipelineLease {
    pub fn pipeline(&self) -> Arc<dyn DetectionPipeline> {
        Arc::clone(&self.inner.pipeline)
    }

    pub async fn estimate_faces(&self, frame: &VideoFrame) -> Result<Vec<DetectedFace>, PipelineError> {
        if self.is_released() {
            return Err(PipelineError::Released);
        }
        self.inner.pipeline.estimate_faces(frame).await
    }

    pub fn release(&self) -> Result<(), PipelineError> {
        if self.released.swap(true, Ordering::AcqRel) {
            warn!("Pipeline lease released twice");
            return Err(PipelineError::Released);
        }
        self.inner.release_one();
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for PipelineLease {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.inner.release_one();
        }
    }
}
