use super::*;
use crate::budget::{base_budget, DegradeReason, ResourceBudget};
use crate::config::DetectionConfig;
use crate::device::DeviceTier;
use crate::error::{AdaptcamError, PipelineError};
use crate::events::{EventBus, EventFilter, RuntimeEvent};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct FakeVideo {
    ready: Mutex<ReadyState>,
    sequence: AtomicU64,
}

impl FakeVideo {
    fn ready() -> Arc<Self> {
        Arc::new(Self {
            ready: Mutex::new(ReadyState::HaveEnoughData),
            sequence: AtomicU64::new(0),
        })
    }

    fn not_ready() -> Arc<Self> {
        let video = Self::ready();
        *video.ready.lock() = ReadyState::HaveMetadata;
        video
    }
}

impl VideoSource for FakeVideo {
    fn ready_state(&self) -> ReadyState {
        *self.ready.lock()
    }

    fn video_width(&self) -> u32 {
        640
    }

    fn video_height(&self) -> u32 {
        480
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        Some(VideoFrame {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            width: 640,
            height: 480,
            data: Arc::from(vec![0u8; 16]),
        })
    }
}

#[derive(Default)]
struct FakePipeline {
    init_fails: bool,
    init_delay: Duration,
    estimate_delay: Duration,
    estimate_fails: bool,
    with_face: bool,
    init_calls: AtomicUsize,
    estimate_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

#[async_trait]
impl DetectionPipeline for FakePipeline {
    async fn initialize(&self, _options: PipelineOptions) -> bool {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init_delay.is_zero() {
            sleep(self.init_delay).await;
        }
        !self.init_fails
    }

    async fn estimate_faces(&self, _frame: &VideoFrame) -> Result<Vec<DetectedFace>, PipelineError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.estimate_delay.is_zero() {
            sleep(self.estimate_delay).await;
        }
        if self.estimate_fails {
            return Err(PipelineError::Estimation {
                details: "model hiccup".to_string(),
            });
        }
        if !self.with_face {
            return Ok(Vec::new());
        }
        Ok(vec![DetectedFace {
            bounding_box: BoundingBox::from_corners(0.0, 0.0, 100.0, 120.0),
            keypoints: (0..468).map(|i| Keypoint::new(i as f64, i as f64)).collect(),
        }])
    }

    fn release(&self) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Draw {
    Render { faces: usize },
    Clear,
}

#[derive(Default)]
struct RecordingRenderer {
    draws: Mutex<Vec<Draw>>,
    presence: Mutex<Vec<bool>>,
}

impl RecordingRenderer {
    fn renders(&self) -> usize {
        self.draws
            .lock()
            .iter()
            .filter(|d| matches!(d, Draw::Render { .. }))
            .count()
    }

    fn last(&self) -> Option<Draw> {
        self.draws.lock().last().copied()
    }
}

impl OverlayRenderer for RecordingRenderer {
    fn render(&self, payload: &DrawingPayload) {
        self.draws.lock().push(Draw::Render {
            faces: payload.faces.len(),
        });
    }

    fn clear(&self) {
        self.draws.lock().push(Draw::Clear);
    }

    fn face_presence(&self, present: bool) {
        self.presence.lock().push(present);
    }
}

struct FixedMemory(f64);

impl MemoryProbe for FixedMemory {
    fn used_mb(&self) -> Option<f64> {
        Some(self.0)
    }
}

fn fast_budget() -> ResourceBudget {
    let mut budget = base_budget(DeviceTier::High);
    budget.detection_interval_ms = 5;
    budget
}

fn options() -> PipelineOptions {
    PipelineOptions::from(&fast_budget())
}

struct Harness {
    detection: Arc<DetectionLoop>,
    pipeline: Arc<FakePipeline>,
    shared: SharedPipeline,
    renderer: Arc<RecordingRenderer>,
    event_bus: Arc<EventBus>,
}

fn harness(pipeline: FakePipeline, video: Arc<FakeVideo>) -> Harness {
    harness_with(pipeline, video, fast_budget(), DetectionConfig::default(), None)
}

fn harness_with(
    pipeline: FakePipeline,
    video: Arc<FakeVideo>,
    budget: ResourceBudget,
    config: DetectionConfig,
    memory: Option<Arc<dyn MemoryProbe>>,
) -> Harness {
    let pipeline = Arc::new(pipeline);
    let shared = SharedPipeline::new(pipeline.clone());
    let renderer = Arc::new(RecordingRenderer::default());
    let event_bus = Arc::new(EventBus::new(64));

    let mut builder = DetectionLoop::builder()
        .pipeline(shared.clone())
        .video(video)
        .renderer(renderer.clone())
        .event_bus(event_bus.clone())
        .config(config)
        .budget(budget);
    if let Some(memory) = memory {
        builder = builder.memory_probe(memory);
    }

    Harness {
        detection: Arc::new(builder.build().unwrap()),
        pipeline,
        shared,
        renderer,
        event_bus,
    }
}

#[tokio::test]
async fn test_start_then_stop_draws_nothing() {
    let h = harness(FakePipeline::default(), FakeVideo::ready());

    h.detection.start().await.unwrap();
    assert_eq!(h.detection.state(), LoopState::Running);
    h.detection.stop();

    sleep(Duration::from_millis(40)).await;
    h.detection.join().await;

    assert_eq!(h.detection.state(), LoopState::Stopped);
    assert_eq!(h.renderer.renders(), 0);
    assert_eq!(h.renderer.last(), Some(Draw::Clear));
    assert_eq!(h.shared.ref_count(), 0);
    assert_eq!(h.pipeline.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stopped_loop_cannot_restart() {
    let h = harness(FakePipeline::default(), FakeVideo::ready());
    h.detection.start().await.unwrap();
    h.detection.stop();
    h.detection.stop();

    let err = h.detection.start().await.unwrap_err();
    assert!(matches!(
        err,
        AdaptcamError::Pipeline(PipelineError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_init_failure_stops_and_reports() {
    let h = harness(
        FakePipeline {
            init_fails: true,
            ..Default::default()
        },
        FakeVideo::ready(),
    );
    let mut failures = h
        .event_bus
        .subscribe_filtered(EventFilter::EventTypes(vec!["pipeline_init_failed"]), "test");

    let err = h.detection.start().await.unwrap_err();
    assert!(err.is_surfaced());
    assert_eq!(h.detection.state(), LoopState::Stopped);
    assert_eq!(h.shared.ref_count(), 0);

    let event = timeout(Duration::from_millis(100), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type(), "pipeline_init_failed");
    assert!(failures.try_recv().unwrap().is_none());

    // no automatic retry
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.pipeline.init_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_frames_render_key_landmarks() {
    let h = harness(
        FakePipeline {
            with_face: true,
            ..Default::default()
        },
        FakeVideo::ready(),
    );
    let mut presence = h
        .event_bus
        .subscribe_filtered(EventFilter::EventTypes(vec!["face_presence_changed"]), "test");

    h.detection.start().await.unwrap();
    sleep(Duration::from_millis(60)).await;
    h.detection.stop();
    h.detection.join().await;

    assert!(h.detection.stats().frames_processed > 1);
    assert!(h
        .renderer
        .draws
        .lock()
        .iter()
        .any(|d| *d == Draw::Render { faces: 1 }));
    assert!(h.renderer.presence.lock().iter().all(|p| *p));

    // reported once, not per frame
    let event = presence.try_recv().unwrap().unwrap();
    assert!(matches!(event, RuntimeEvent::FacePresenceChanged { present: true }));
    assert!(presence.try_recv().unwrap().is_none());
}

#[tokio::test]
async fn test_frame_errors_count_as_no_faces() {
    let h = harness(
        FakePipeline {
            estimate_fails: true,
            ..Default::default()
        },
        FakeVideo::ready(),
    );

    h.detection.start().await.unwrap();
    sleep(Duration::from_millis(60)).await;
    assert_eq!(h.detection.state(), LoopState::Running);
    h.detection.stop();
    h.detection.join().await;

    let stats = h.detection.stats();
    assert!(stats.detection_errors > 1);
    assert_eq!(stats.detection_errors, stats.frames_processed);
    assert!(h
        .renderer
        .draws
        .lock()
        .iter()
        .all(|d| matches!(d, Draw::Render { faces: 0 } | Draw::Clear)));
    assert!(h.renderer.presence.lock().iter().all(|p| !*p));
}

#[tokio::test]
async fn test_unready_video_is_skipped() {
    let video = FakeVideo::not_ready();
    let h = harness(FakePipeline::default(), video.clone());

    h.detection.start().await.unwrap();
    sleep(Duration::from_millis(60)).await;

    let stats = h.detection.stats();
    assert!(stats.frames_skipped > 0);
    assert_eq!(stats.frames_processed, 0);
    assert_eq!(h.pipeline.estimate_calls.load(Ordering::SeqCst), 0);

    *video.ready.lock() = ReadyState::HaveEnoughData;
    sleep(Duration::from_millis(60)).await;
    assert!(h.detection.stats().frames_processed > 0);

    h.detection.stop();
}

#[tokio::test]
async fn test_in_flight_result_after_stop_is_discarded() {
    let h = harness(
        FakePipeline {
            estimate_delay: Duration::from_millis(100),
            with_face: true,
            ..Default::default()
        },
        FakeVideo::ready(),
    );

    h.detection.start().await.unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.pipeline.estimate_calls.load(Ordering::SeqCst), 1);

    h.detection.stop();
    sleep(Duration::from_millis(150)).await;
    h.detection.join().await;

    assert_eq!(h.renderer.renders(), 0);
    assert_eq!(h.detection.stats().results_discarded, 1);
    assert_eq!(h.renderer.last(), Some(Draw::Clear));
}

#[tokio::test]
async fn test_pause_clears_and_resume_continues() {
    let h = harness(FakePipeline::default(), FakeVideo::ready());

    h.detection.start().await.unwrap();
    sleep(Duration::from_millis(40)).await;
    h.detection.pause();
    assert_eq!(h.detection.state(), LoopState::Paused);
    assert_eq!(h.renderer.last(), Some(Draw::Clear));

    let paused_at = h.detection.stats().frames_processed;
    sleep(Duration::from_millis(40)).await;
    assert_eq!(h.detection.stats().frames_processed, paused_at);
    // the lease survives a pause
    assert_eq!(h.shared.ref_count(), 1);

    h.detection.start().await.unwrap();
    assert_eq!(h.detection.state(), LoopState::Running);
    sleep(Duration::from_millis(40)).await;
    assert!(h.detection.stats().frames_processed > paused_at);

    h.detection.stop();
    assert_eq!(h.pipeline.init_calls.load(Ordering::SeqCst), 1);
    assert!(h.detection.resume().is_err());
}

#[tokio::test]
async fn test_stop_during_initialization() {
    let h = harness(
        FakePipeline {
            init_delay: Duration::from_millis(80),
            ..Default::default()
        },
        FakeVideo::ready(),
    );

    let detection = h.detection.clone();
    let start = tokio::spawn(async move { detection.start().await });

    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.detection.state(), LoopState::Initializing);
    h.detection.stop();

    start.await.unwrap().unwrap();
    assert_eq!(h.detection.state(), LoopState::Stopped);
    assert_eq!(h.shared.ref_count(), 0);
    assert_eq!(h.pipeline.release_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.renderer.renders(), 0);
}

#[tokio::test]
async fn test_disabled_detection_never_loads_pipeline() {
    let mut budget = fast_budget();
    budget.detection_enabled = false;
    let h = harness_with(
        FakePipeline::default(),
        FakeVideo::ready(),
        budget,
        DetectionConfig::default(),
        None,
    );

    h.detection.start().await.unwrap();
    assert_eq!(h.detection.state(), LoopState::Stopped);
    assert_eq!(h.pipeline.init_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sustained_memory_pressure_reports_degrade_once() {
    let config = DetectionConfig {
        evaluation_interval_frames: 2,
        sustained_checks: 2,
        ..Default::default()
    };
    let h = harness_with(
        FakePipeline::default(),
        FakeVideo::ready(),
        fast_budget(),
        config,
        Some(Arc::new(FixedMemory(4096.0))),
    );
    let mut degrades = h
        .event_bus
        .subscribe_filtered(EventFilter::EventTypes(vec!["degrade_detected"]), "test");

    h.detection.start().await.unwrap();

    let event = timeout(Duration::from_secs(2), degrades.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        RuntimeEvent::DegradeDetected { hint, .. } => {
            assert_eq!(hint.reason, DegradeReason::MemoryPressure);
            assert_eq!(hint.mean_memory_mb, Some(4096.0));
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    // further bad checks in the same run stay quiet
    sleep(Duration::from_millis(60)).await;
    h.detection.stop();
    assert_eq!(h.detection.stats().degrade_reports, 1);
    assert!(degrades.try_recv().unwrap().is_none());
    assert!(h.detection.degrade_hint().is_some());
}

#[tokio::test]
async fn test_slow_frames_report_low_frame_rate() {
    let config = DetectionConfig {
        evaluation_interval_frames: 2,
        sustained_checks: 1,
        ..Default::default()
    };
    let h = harness_with(
        FakePipeline {
            estimate_delay: Duration::from_millis(150),
            ..Default::default()
        },
        FakeVideo::ready(),
        fast_budget(),
        config,
        None,
    );
    let mut degrades = h
        .event_bus
        .subscribe_filtered(EventFilter::EventTypes(vec!["degrade_detected"]), "test");

    h.detection.start().await.unwrap();
    let event = timeout(Duration::from_secs(3), degrades.recv())
        .await
        .unwrap()
        .unwrap();
    h.detection.stop();

    match event {
        RuntimeEvent::DegradeDetected { hint, .. } => {
            assert_eq!(hint.reason, DegradeReason::LowFrameRate);
            assert!(hint.observed_fps > 0.0 && hint.observed_fps < 10.0);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_shared_pipeline_initializes_once() {
    let pipeline = Arc::new(FakePipeline {
        init_delay: Duration::from_millis(20),
        ..Default::default()
    });
    let shared = SharedPipeline::new(pipeline.clone());

    let (a, b) = tokio::join!(shared.acquire(options()), shared.acquire(options()));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(pipeline.init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(shared.ref_count(), 2);
    assert!(shared.is_initialized());

    a.release().unwrap();
    assert_eq!(shared.ref_count(), 1);
    assert_eq!(pipeline.release_calls.load(Ordering::SeqCst), 0);
    assert_eq!(a.release(), Err(PipelineError::Released));
    assert_eq!(shared.ref_count(), 1);

    drop(b);
    assert_eq!(shared.ref_count(), 0);
    assert_eq!(pipeline.release_calls.load(Ordering::SeqCst), 1);
    assert!(!shared.is_initialized());

    // dropping an already released lease does not release again
    drop(a);
    assert_eq!(pipeline.release_calls.load(Ordering::SeqCst), 1);

    let c = shared.acquire(options()).await.unwrap();
    assert_eq!(pipeline.init_calls.load(Ordering::SeqCst), 2);
    c.release().unwrap();
}

#[tokio::test]
async fn test_concurrent_acquirers_share_failure() {
    let pipeline = Arc::new(FakePipeline {
        init_fails: true,
        init_delay: Duration::from_millis(20),
        ..Default::default()
    });
    let shared = SharedPipeline::new(pipeline.clone());

    let (a, b) = tokio::join!(shared.acquire(options()), shared.acquire(options()));
    assert!(matches!(a, Err(PipelineError::Initialization { .. })));
    assert!(matches!(b, Err(PipelineError::Initialization { .. })));

    assert_eq!(pipeline.init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(shared.ref_count(), 0);
    assert_eq!(pipeline.release_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_released_lease_refuses_estimates() {
    let shared = SharedPipeline::new(Arc::new(FakePipeline::default()));
    let lease = shared.acquire(options()).await.unwrap();
    let frame = FakeVideo::ready().current_frame().unwrap();

    assert!(lease.estimate_faces(&frame).await.unwrap().is_empty());
    lease.release().unwrap();
    assert_eq!(lease.estimate_faces(&frame).await, Err(PipelineError::Released));
}

#[test]
fn test_builder_requires_collaborators() {
    assert!(DetectionLoop::builder().build().is_err());
    assert!(DetectionLoop::builder()
        .pipeline(SharedPipeline::new(Arc::new(FakePipeline::default())))
        .video(FakeVideo::ready())
        .renderer(Arc::new(RecordingRenderer::default()))
        .build()
        .is_err());
}
